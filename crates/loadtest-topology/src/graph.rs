//! Directed, multi-parent, cycle-tolerant identifier graph.

use crate::error::TopologyError;
use crate::view::NodeSet;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

/// A node stored in the arena.
struct Node<T> {
    id: T,
    children: Vec<usize>,
    parents: Vec<usize>,
    top_level: bool,
}

impl<T> Node<T> {
    fn new(id: T) -> Self {
        Self {
            id,
            children: Vec::new(),
            parents: Vec::new(),
            top_level: false,
        }
    }
}

/// One frame of an explicit-stack depth-first walk.
struct Frame {
    slot: usize,
    cursor: usize,
    extended: bool,
}

/// Directed graph of identifier values.
///
/// Mutation is append-only: nodes and relationships can be added, top-level
/// marks toggled, and the whole graph cleared, but nothing can be removed
/// individually. Relationships have set semantics, so adding the same
/// `(parent, child)` pair twice is a no-op.
///
/// The "top-level parent" mark is independent of structure: a node with no
/// parents is a structural root whether or not it is marked, and a marked
/// node may well have parents. [`sync_structural_top_level_parents_to_marked`]
/// reconciles the two.
///
/// [`sync_structural_top_level_parents_to_marked`]: IdTopologyGraph::sync_structural_top_level_parents_to_marked
pub struct IdTopologyGraph<T> {
    nodes: Vec<Node<T>>,
    index: HashMap<T, usize>,
    edges: HashSet<(usize, usize)>,
    /// Marked slots, kept sorted so iteration follows insertion order.
    marked: Vec<usize>,
}

impl<T> Default for IdTopologyGraph<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: HashSet::new(),
            marked: Vec::new(),
        }
    }
}

impl<T> IdTopologyGraph<T> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn id_at_slot(&self, slot: usize) -> &T {
        &self.nodes[slot].id
    }

    /// Total number of distinct nodes.
    pub fn total(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct `(parent, child)` relationships.
    pub fn relationship_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of distinct nodes that are the child of at least one relationship.
    pub fn total_distinct_child_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.parents.is_empty()).count()
    }

    /// Number of nodes currently marked as top-level parents.
    pub fn top_level_parent_count(&self) -> usize {
        self.marked.len()
    }

    /// Iterate every node in insertion order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().map(|n| &n.id)
    }

    /// Nodes currently marked as top-level parents.
    pub fn top_level_parents(&self) -> NodeSet<'_, T> {
        NodeSet::new(self, &self.marked)
    }

    /// Reset to the empty graph.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.edges.clear();
        self.marked.clear();
    }

    /// Walk every simple path starting at `start` with at most `max_hops` hops.
    ///
    /// `visit` is called once per path when the walk backs out of its last
    /// node. The flag is true when the path could not be extended (leaf, hop
    /// bound reached, or every child already on the path).
    fn for_each_simple_path<F>(&self, start: usize, max_hops: usize, mut visit: F)
    where
        F: FnMut(&[usize], bool),
    {
        let mut on_path = vec![false; self.nodes.len()];
        let mut stack = vec![Frame {
            slot: start,
            cursor: 0,
            extended: false,
        }];
        let mut path = vec![start];
        on_path[start] = true;

        while let Some(frame) = stack.last_mut() {
            let hops = path.len() - 1;
            let next = if hops < max_hops {
                self.nodes[frame.slot].children.get(frame.cursor).copied()
            } else {
                None
            };

            match next {
                Some(child) => {
                    frame.cursor += 1;
                    if !on_path[child] {
                        frame.extended = true;
                        on_path[child] = true;
                        path.push(child);
                        stack.push(Frame {
                            slot: child,
                            cursor: 0,
                            extended: false,
                        });
                    }
                }
                None => {
                    visit(&path, !frame.extended);
                    on_path[frame.slot] = false;
                    stack.pop();
                    path.pop();
                }
            }
        }
    }

    fn max_depth_from_slot(&self, slot: usize) -> usize {
        let mut max = 0;
        self.for_each_simple_path(slot, usize::MAX, |path, _| {
            max = max.max(path.len() - 1);
        });
        max
    }

    /// Slots at hop `level` on every simple path of exactly `hops` hops.
    fn slots_at_level(&self, root: usize, hops: usize, level: usize) -> HashSet<usize> {
        let mut found = HashSet::new();
        self.for_each_simple_path(root, hops, |path, _| {
            if path.len() - 1 == hops {
                found.insert(path[level]);
            }
        });
        found
    }
}

impl<T: Eq + Hash> IdTopologyGraph<T> {
    pub(crate) fn slot_of(&self, id: &T) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether `id` is a node of the graph.
    pub fn contains(&self, id: &T) -> bool {
        self.index.contains_key(id)
    }
}

impl<T: Eq + Hash + Clone> IdTopologyGraph<T> {
    fn ensure_slot(&mut self, id: &T) -> usize {
        if let Some(slot) = self.index.get(id) {
            return *slot;
        }
        let slot = self.nodes.len();
        self.nodes.push(Node::new(id.clone()));
        self.index.insert(id.clone(), slot);
        slot
    }

    fn set_mark(&mut self, slot: usize, marked: bool) -> bool {
        if self.nodes[slot].top_level == marked {
            return false;
        }
        self.nodes[slot].top_level = marked;
        match self.marked.binary_search(&slot) {
            Ok(pos) if !marked => {
                self.marked.remove(pos);
            }
            Err(pos) if marked => self.marked.insert(pos, slot),
            _ => {}
        }
        true
    }

    fn ids_of(&self, slots: impl IntoIterator<Item = usize>) -> HashSet<T> {
        slots
            .into_iter()
            .map(|slot| self.nodes[slot].id.clone())
            .collect()
    }

    /// Insert an isolated node. Idempotent.
    pub fn add_node(&mut self, id: &T) {
        self.ensure_slot(id);
    }

    /// Add a `parent → child` relationship, inserting missing endpoints.
    ///
    /// Returns `false` when the relationship already existed.
    pub fn add_relationship(&mut self, parent: &T, child: &T) -> bool {
        let p = self.ensure_slot(parent);
        let c = self.ensure_slot(child);
        if !self.edges.insert((p, c)) {
            return false;
        }
        self.nodes[p].children.push(c);
        self.nodes[c].parents.push(p);
        true
    }

    /// Chain consecutive elements of `path` as relationships.
    ///
    /// A single-element path has no relationship; its node is marked as a
    /// top-level parent. An empty path is ignored.
    pub fn add_path(&mut self, path: &[T]) {
        match path {
            [] => {}
            [only] => {
                let slot = self.ensure_slot(only);
                self.set_mark(slot, true);
            }
            _ => {
                for pair in path.windows(2) {
                    self.add_relationship(&pair[0], &pair[1]);
                }
            }
        }
    }

    /// Mark `id` as a top-level parent, inserting it when unknown.
    ///
    /// Returns `true` when the mark changed.
    pub fn mark_as_top_level_parent(&mut self, id: &T) -> bool {
        let slot = self.ensure_slot(id);
        self.set_mark(slot, true)
    }

    /// Remove the top-level mark from `id`.
    ///
    /// Returns `true` when the mark changed; unknown nodes are left alone.
    pub fn unmark_as_top_level_parent(&mut self, id: &T) -> bool {
        match self.slot_of(id) {
            Some(slot) => self.set_mark(slot, false),
            None => false,
        }
    }

    /// Whether `id` is marked as a top-level parent.
    pub fn is_top_level_parent(&self, id: &T) -> bool {
        self.slot_of(id).is_some_and(|slot| self.nodes[slot].top_level)
    }

    /// Direct children of `id`; empty for unknown nodes.
    pub fn direct_children(&self, id: &T) -> NodeSet<'_, T> {
        match self.slot_of(id) {
            Some(slot) => NodeSet::new(self, &self.nodes[slot].children),
            None => NodeSet::empty(self),
        }
    }

    /// Direct parents of `id`; empty for unknown nodes.
    pub fn parents(&self, id: &T) -> NodeSet<'_, T> {
        match self.slot_of(id) {
            Some(slot) => NodeSet::new(self, &self.nodes[slot].parents),
            None => NodeSet::empty(self),
        }
    }

    /// Every node reachable from `id` within `depth` hops, excluding `id`.
    ///
    /// Breadth-first; a node already reached is never expanded again, so
    /// cycles terminate.
    pub fn descendants(&self, id: &T, depth: usize) -> Result<HashSet<T>, TopologyError> {
        if depth < 1 {
            return Err(TopologyError::InvalidDepth(depth));
        }
        let Some(start) = self.slot_of(id) else {
            return Ok(HashSet::new());
        };

        let mut seen = vec![false; self.nodes.len()];
        seen[start] = true;
        let mut found = Vec::new();
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((slot, hops)) = queue.pop_front() {
            if hops == depth {
                continue;
            }
            for &child in &self.nodes[slot].children {
                if !seen[child] {
                    seen[child] = true;
                    found.push(child);
                    queue.push_back((child, hops + 1));
                }
            }
        }

        Ok(self.ids_of(found))
    }

    /// Structural roots: nodes with no incoming relationship.
    pub fn find_top_level_parents(&self) -> HashSet<T> {
        self.ids_of(
            self.nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.parents.is_empty())
                .map(|(slot, _)| slot),
        )
    }

    /// Mark every structural root; returns only the roots newly marked.
    pub fn sync_structural_top_level_parents_to_marked(&mut self) -> HashSet<T> {
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&slot| self.nodes[slot].parents.is_empty())
            .collect();
        let newly: Vec<usize> = roots
            .into_iter()
            .filter(|&slot| self.set_mark(slot, true))
            .collect();
        self.ids_of(newly)
    }

    /// Length in hops of the longest simple path starting at `id`.
    ///
    /// Zero for leaves and unknown nodes. A cycle is never walked twice on
    /// the same branch.
    pub fn max_depth_from(&self, id: &T) -> usize {
        self.slot_of(id)
            .map_or(0, |slot| self.max_depth_from_slot(slot))
    }

    /// Maximum of [`max_depth_from`](Self::max_depth_from) over marked parents.
    pub fn max_depth_overall(&self) -> usize {
        self.marked
            .iter()
            .map(|&slot| self.max_depth_from_slot(slot))
            .max()
            .unwrap_or(0)
    }

    /// Every maximal simple path of at most `max_depth` hops per marked parent.
    pub fn all_top_level_paths(&self, max_depth: usize) -> HashMap<T, Vec<Vec<T>>> {
        let mut result = HashMap::with_capacity(self.marked.len());
        for &root in &self.marked {
            let mut paths = Vec::new();
            self.for_each_simple_path(root, max_depth, |path, maximal| {
                if maximal {
                    paths.push(
                        path.iter()
                            .map(|&slot| self.nodes[slot].id.clone())
                            .collect(),
                    );
                }
            });
            result.insert(self.nodes[root].id.clone(), paths);
        }
        result
    }

    /// Nodes `depth_from_bottom` hops above the deepest leaves under `root`.
    ///
    /// `assumed_total_depth` is an upper bound: when it overstates what is
    /// actually reachable the real depth is used instead, and a
    /// `depth_from_bottom` past the root clamps to the root itself.
    pub fn nodes_at_depth_from_bottom(
        &self,
        root: &T,
        assumed_total_depth: usize,
        depth_from_bottom: usize,
    ) -> HashSet<T> {
        let Some(slot) = self.slot_of(root) else {
            return HashSet::new();
        };
        let depth = assumed_total_depth.min(self.max_depth_from_slot(slot));
        let level = depth.saturating_sub(depth_from_bottom);
        self.ids_of(self.slots_at_level(slot, depth, level))
    }

    /// Union of [`nodes_at_depth_from_bottom`] for every level up to `depth_from_bottom`.
    ///
    /// [`nodes_at_depth_from_bottom`]: Self::nodes_at_depth_from_bottom
    pub fn nodes_up_to_depth_from_bottom(
        &self,
        root: &T,
        assumed_total_depth: usize,
        depth_from_bottom: usize,
    ) -> HashSet<T> {
        let Some(slot) = self.slot_of(root) else {
            return HashSet::new();
        };
        let depth = assumed_total_depth.min(self.max_depth_from_slot(slot));
        let mut found = HashSet::new();
        for up in 0..=depth_from_bottom.min(depth) {
            found.extend(self.slots_at_level(slot, depth, depth - up));
        }
        self.ids_of(found)
    }
}

impl<T: fmt::Debug> fmt::Debug for IdTopologyGraph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdTopologyGraph")
            .field("nodes", &self.nodes.len())
            .field("relationships", &self.edges.len())
            .field("top_level_parents", &self.marked.len())
            .finish()
    }
}
