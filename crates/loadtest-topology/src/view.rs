//! Read-only views over node sets stored inside the graph.

use crate::graph::IdTopologyGraph;
use std::fmt;
use std::hash::Hash;

/// Borrowed, read-only view of a set of nodes held by an [`IdTopologyGraph`].
///
/// Returned by child, parent and top-level-parent lookups. The view borrows
/// the graph, so it cannot outlive it and exposes no way to mutate it.
pub struct NodeSet<'a, T> {
    graph: &'a IdTopologyGraph<T>,
    members: &'a [usize],
}

impl<'a, T> NodeSet<'a, T> {
    pub(crate) fn new(graph: &'a IdTopologyGraph<T>, members: &'a [usize]) -> Self {
        Self { graph, members }
    }

    pub(crate) fn empty(graph: &'a IdTopologyGraph<T>) -> Self {
        Self { graph, members: &[] }
    }

    /// Number of nodes in the view.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the view contains no nodes.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate the node identifiers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &'a T> + 'a {
        let graph = self.graph;
        let members = self.members;
        members.iter().map(move |&slot| graph.id_at_slot(slot))
    }
}

impl<T: Eq + Hash> NodeSet<'_, T> {
    /// Whether `id` is a member of the view.
    pub fn contains(&self, id: &T) -> bool {
        self.graph
            .slot_of(id)
            .is_some_and(|slot| self.members.contains(&slot))
    }
}

impl<T: Clone> NodeSet<'_, T> {
    /// Copy the members out of the graph.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Clone for NodeSet<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeSet<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for NodeSet<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
