//! Identifier topology for graph load tests.
//!
//! This crate models just enough of a graph (parent → child relationships
//! between sampled identifiers) to produce realistic multi-hop id chains for
//! query parameters. It is not a general graph store.
//!
//! # Architecture
//!
//! ```text
//!          ┌────────────────────────────┐
//!          │     IdTopologyGraph<T>     │
//!          │                            │
//!          │  index: T -> slot          │
//!          │  nodes: [Node<T>] (arena)  │
//!          │  edges: {(parent, child)}  │
//!          │  marked top-level parents  │
//!          └─────────────┬──────────────┘
//!                        │ depth / path queries
//!                        ▼
//!       explicit-stack DFS with per-branch visited marks
//! ```
//!
//! Nodes live in an arena and are addressed by index. Traversals never recurse
//! on live references; they keep their own stack and an `on_path` mark per
//! arena slot, so cycles terminate while cousin branches are still explored.
//!
//! # Example
//!
//! ```rust
//! use loadtest_topology::IdTopologyGraph;
//!
//! let mut graph = IdTopologyGraph::new();
//! graph.add_path(&["A", "B", "C", "D"]);
//! graph.sync_structural_top_level_parents_to_marked();
//!
//! assert_eq!(graph.relationship_count(), 3);
//! assert_eq!(graph.max_depth_overall(), 3);
//! ```

mod error;
mod graph;
mod view;

pub use error::TopologyError;
pub use graph::IdTopologyGraph;
pub use view::NodeSet;
