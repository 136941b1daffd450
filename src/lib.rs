//! Graph database load generator.
//!
//! Samples chains of related node ids from a graph, substitutes them into a
//! positional query template and runs the resulting queries at a target rate.
//!
//! # Crates
//!
//! - `loadtest_topology` - identifier topology graph (parents, children, paths)
//! - `loadtest_sampler` - thread-safe id chain sampling over the topology
//! - `loadtest_template` - `%s` / `%N$s` / `%-N$s` query templates
//! - `loadtest_framework` - rate-paced scheduler, metrics and run summaries
//!
//! # CLI Usage
//!
//! ```bash
//! # Fixed rate with ids loaded from the database
//! graph-loadtest run \
//!   --neo4j-uri bolt://localhost:7687 \
//!   --id-query "MATCH p = (a:Person)-[:KNOWS*2]->() RETURN [n IN nodes(p) | id(n)] AS ids LIMIT 5000" \
//!   --template "MATCH (a)-->(b) WHERE id(a) = %s AND id(b) = %2\$s RETURN count(*)" \
//!   --qps 500 --duration 5m --warmup 30s
//!
//! # Ramp from 100 to 2000 calls/s, aborting when throughput falls 25% behind
//! graph-loadtest run --template "..." --id-query "..." \
//!   --ramp-start 100 --ramp-increment 100 --ramp-end 2000 --ramp-step 30s \
//!   --qps-deviation-pct 25
//! ```

use clap::Parser;

pub mod args;
pub mod client;
pub mod config;
pub mod neo4j;
pub mod workload;

pub use args::RunArgs;
pub use client::QueryClient;
pub use neo4j::Neo4jClient;
pub use workload::{GraphQueryWorkload, IdSource};

#[derive(Parser, Clone, Debug)]
pub struct Neo4jOpts {
    /// Neo4j Bolt URI
    #[arg(long, default_value = "bolt://localhost:7687", env = "NEO4J_URI")]
    pub neo4j_uri: String,

    /// Neo4j username
    #[arg(long, default_value = "neo4j", env = "NEO4J_USERNAME")]
    pub neo4j_username: String,

    /// Neo4j password
    #[arg(long, default_value = "password", env = "NEO4J_PASSWORD")]
    pub neo4j_password: String,

    /// Neo4j database
    #[arg(long, default_value = "neo4j", env = "NEO4J_DATABASE")]
    pub neo4j_database: String,

    /// Size of the connection pool
    #[arg(long, default_value = "16")]
    pub neo4j_max_connections: usize,
}
