//! Owned snapshot of one sampled id chain.

/// Ordered ids walked from a top-level parent down to some depth.
///
/// Chains are handed out by value so each dispatched call works on its own
/// snapshot while the sampler keeps loading.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdChain<T> {
    ids: Vec<T>,
}

impl<T> IdChain<T> {
    /// Wrap an ordered id sequence.
    pub fn new(ids: Vec<T>) -> Self {
        Self { ids }
    }

    /// Number of ids in the chain.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of relationships walked (one less than the id count).
    pub fn hops(&self) -> usize {
        self.ids.len().saturating_sub(1)
    }

    /// Id at 1-based `position`; `None` past the end or for position 0.
    pub fn position(&self, position: usize) -> Option<&T> {
        position.checked_sub(1).and_then(|i| self.ids.get(i))
    }

    /// Id `hops` relationships below the top-level parent.
    pub fn from_top(&self, hops: usize) -> Option<&T> {
        self.ids.get(hops)
    }

    /// Id `hops` relationships above the last id of the chain.
    pub fn from_bottom(&self, hops: usize) -> Option<&T> {
        self.ids
            .len()
            .checked_sub(hops + 1)
            .and_then(|i| self.ids.get(i))
    }

    /// The top-level parent the chain starts at.
    pub fn first(&self) -> Option<&T> {
        self.ids.first()
    }

    /// The deepest id of the chain.
    pub fn last(&self) -> Option<&T> {
        self.ids.last()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.ids
    }

    pub fn into_inner(self) -> Vec<T> {
        self.ids
    }
}

impl<T> From<Vec<T>> for IdChain<T> {
    fn from(ids: Vec<T>) -> Self {
        Self::new(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_is_one_based() {
        let chain = IdChain::from(vec!["a", "b", "c"]);
        assert_eq!(chain.position(0), None);
        assert_eq!(chain.position(1), Some(&"a"));
        assert_eq!(chain.position(3), Some(&"c"));
        assert_eq!(chain.position(4), None);
    }

    #[test]
    fn test_from_top_and_bottom() {
        let chain = IdChain::from(vec![10, 20, 30, 40]);
        assert_eq!(chain.hops(), 3);
        assert_eq!(chain.from_top(0), Some(&10));
        assert_eq!(chain.from_top(3), Some(&40));
        assert_eq!(chain.from_bottom(0), Some(&40));
        assert_eq!(chain.from_bottom(3), Some(&10));
        assert_eq!(chain.from_bottom(4), None);
    }

    #[test]
    fn test_empty_chain() {
        let chain: IdChain<u8> = IdChain::default();
        assert!(chain.is_empty());
        assert_eq!(chain.hops(), 0);
        assert_eq!(chain.first(), None);
        assert_eq!(chain.from_bottom(0), None);
    }
}
