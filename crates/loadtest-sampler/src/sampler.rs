//! Sampler that turns loaded id paths into per-call chains.

use crate::chain::IdChain;
use crate::config::{SamplerConfig, SamplingStrategy};
use crate::error::SamplerError;
use loadtest_topology::IdTopologyGraph;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

struct SamplerState<T> {
    graph: IdTopologyGraph<T>,
    /// First longest path loaded; used by `ids()` and as the fallback chain.
    representative: Vec<T>,
    paths_loaded: usize,
    initial_depth: Option<usize>,
    depth: usize,
    /// Enumerated top-level paths, only kept for `SamplingStrategy::UniformPath`.
    path_cache: Vec<Vec<T>>,
}

impl<T> Default for SamplerState<T> {
    fn default() -> Self {
        Self {
            graph: IdTopologyGraph::new(),
            representative: Vec::new(),
            paths_loaded: 0,
            initial_depth: None,
            depth: 0,
            path_cache: Vec::new(),
        }
    }
}

/// Owns an [`IdTopologyGraph`] and hands out owned [`IdChain`] snapshots.
///
/// Loads take the write lock; sampling only needs the read lock, so many
/// workers can sample at once while loads are serialized.
pub struct IdChainSampler<T> {
    config: SamplerConfig,
    state: RwLock<SamplerState<T>>,
}

impl<T: Eq + Hash + Clone> IdChainSampler<T> {
    /// Create an empty sampler.
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(SamplerState::default()),
        }
    }

    /// Create a sampler pre-loaded with a fixed seed set of paths.
    pub fn from_paths(config: SamplerConfig, paths: &[Vec<T>]) -> Self {
        let sampler = Self::new(config);
        sampler.add_paths(paths);
        sampler
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, SamplerState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SamplerState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bulk-load id paths.
    ///
    /// The first id of every path is marked as a top-level parent. Paths past
    /// the configured buffer size are dropped. Returns how many paths were
    /// accepted.
    pub fn add_paths(&self, paths: &[Vec<T>]) -> usize {
        let mut state = self.write();
        let capacity = self.config.buffer_size.saturating_sub(state.paths_loaded);
        let offered = paths.iter().filter(|p| !p.is_empty()).count();

        let mut accepted = 0;
        let mut load_depth = 0;
        for path in paths.iter().filter(|p| !p.is_empty()).take(capacity) {
            state.graph.add_path(path);
            state.graph.mark_as_top_level_parent(&path[0]);
            if path.len() > state.representative.len() {
                state.representative = path.clone();
            }
            load_depth = load_depth.max(path.len() - 1);
            accepted += 1;
        }

        if accepted < offered {
            warn!(
                "Id sample buffer full ({} paths): dropped {} of {} offered paths",
                self.config.buffer_size,
                offered - accepted,
                offered
            );
        }
        if accepted == 0 {
            return 0;
        }

        state.paths_loaded += accepted;
        if state.initial_depth.is_none() {
            state.initial_depth = Some(load_depth);
        }
        state.depth = state.depth.max(load_depth);

        if self.config.strategy == SamplingStrategy::UniformPath {
            let mut by_parent = state.graph.all_top_level_paths(self.config.max_path_depth);
            let cache: Vec<Vec<T>> = state
                .graph
                .top_level_parents()
                .iter()
                .filter_map(|parent| by_parent.remove(parent))
                .flatten()
                .collect();
            state.path_cache = cache;
        }

        debug!(
            "Loaded {} id paths: {} ids, {} relationships, depth {}",
            accepted,
            state.graph.total(),
            state.graph.relationship_count(),
            state.depth
        );
        accepted
    }

    /// Whether at least one identifier is loaded.
    pub fn ids_exist(&self) -> bool {
        !self.read().graph.is_empty()
    }

    /// Hop count of the paths from the first load.
    pub fn initial_depth(&self) -> usize {
        self.read().initial_depth.unwrap_or(0)
    }

    /// Deepest hop count seen across every load.
    pub fn depth(&self) -> usize {
        self.read().depth
    }

    /// Distinct identifiers known.
    pub fn id_count(&self) -> usize {
        self.read().graph.total()
    }

    /// Relationships known.
    pub fn relationship_count(&self) -> usize {
        self.read().graph.relationship_count()
    }

    /// Number of paths accepted so far.
    pub fn paths_loaded(&self) -> usize {
        self.read().paths_loaded
    }

    /// The representative chain used for default resolution.
    pub fn ids(&self) -> IdChain<T> {
        IdChain::new(self.read().representative.clone())
    }

    /// Run `f` against the underlying topology under the read lock.
    pub fn with_topology<R>(&self, f: impl FnOnce(&IdTopologyGraph<T>) -> R) -> R {
        f(&self.read().graph)
    }

    /// Drop every loaded path.
    pub fn clear(&self) {
        *self.write() = SamplerState::default();
    }

    /// Sample a fresh chain of at most `length` ids.
    ///
    /// A `length` of zero asks for the configured maximum path depth. The
    /// chain can be shorter than requested when the topology runs out.
    pub fn sample_chain<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        length: usize,
    ) -> Result<IdChain<T>, SamplerError> {
        let state = self.read();
        if state.graph.is_empty() {
            return Err(SamplerError::NoIds);
        }

        let target = if length == 0 {
            self.config.max_path_depth + 1
        } else {
            length
        };

        let mut ids = match self.config.strategy {
            SamplingStrategy::Fixed => None,
            SamplingStrategy::RandomWalk => random_walk(&state.graph, rng, target),
            SamplingStrategy::UniformPath => state.path_cache.choose(rng).cloned(),
        }
        .unwrap_or_else(|| state.representative.clone());

        ids.truncate(target);
        Ok(IdChain::new(ids))
    }

    /// Id `depth` hops below the top-level parent of a freshly sampled chain.
    pub fn id_at_depth<R: Rng + ?Sized>(&self, rng: &mut R, depth: usize) -> Option<T> {
        let chain = self.sample_chain(rng, depth + 1).ok()?;
        chain.from_top(depth).cloned()
    }

    /// Deepest id of a freshly sampled full-depth chain.
    pub fn vid<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<T> {
        let depth = self.depth();
        let chain = self.sample_chain(rng, depth + 1).ok()?;
        chain.last().cloned()
    }
}

/// Walk random unvisited children from a random marked parent.
fn random_walk<T, R>(graph: &IdTopologyGraph<T>, rng: &mut R, target: usize) -> Option<Vec<T>>
where
    T: Eq + Hash + Clone,
    R: Rng + ?Sized,
{
    let parents = graph.top_level_parents();
    if parents.is_empty() {
        return None;
    }
    let start = parents.iter().nth(rng.random_range(0..parents.len()))?;

    let mut chain = vec![start.clone()];
    let mut visited: HashSet<&T> = HashSet::from([start]);
    let mut current = start;

    while chain.len() < target {
        let candidates: Vec<&T> = graph
            .direct_children(current)
            .iter()
            .filter(|child| !visited.contains(child))
            .collect();
        let Some(&next) = candidates.choose(rng) else {
            break;
        };
        visited.insert(next);
        chain.push(next.clone());
        current = next;
    }

    Some(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn paths() -> Vec<Vec<u32>> {
        vec![vec![1, 2, 3, 4], vec![1, 5, 6], vec![10, 11]]
    }

    fn sampler(strategy: SamplingStrategy) -> IdChainSampler<u32> {
        let config = SamplerConfig::default().with_strategy(strategy);
        IdChainSampler::from_paths(config, &paths())
    }

    #[test]
    fn test_empty_sampler_reports_no_ids() {
        let sampler: IdChainSampler<u32> = IdChainSampler::new(SamplerConfig::default());
        let mut rng = StdRng::seed_from_u64(1);

        assert!(!sampler.ids_exist());
        assert_eq!(sampler.sample_chain(&mut rng, 3), Err(SamplerError::NoIds));
        assert_eq!(sampler.id_at_depth(&mut rng, 0), None);
        assert_eq!(sampler.vid(&mut rng), None);
        assert!(sampler.ids().is_empty());
    }

    #[test]
    fn test_load_statistics() {
        let sampler = sampler(SamplingStrategy::RandomWalk);

        assert!(sampler.ids_exist());
        assert_eq!(sampler.initial_depth(), 3);
        assert_eq!(sampler.depth(), 3);
        assert_eq!(sampler.id_count(), 8);
        assert_eq!(sampler.relationship_count(), 6);
        assert_eq!(sampler.paths_loaded(), 3);
        assert_eq!(sampler.ids().into_inner(), vec![1, 2, 3, 4]);
        assert_eq!(sampler.with_topology(|g| g.top_level_parent_count()), 2);
    }

    #[test]
    fn test_depth_tracks_later_loads() {
        let sampler = sampler(SamplingStrategy::RandomWalk);
        sampler.add_paths(&[vec![20, 21, 22, 23, 24, 25]]);

        assert_eq!(sampler.initial_depth(), 3);
        assert_eq!(sampler.depth(), 5);
    }

    #[test]
    fn test_buffer_size_limits_paths() {
        let config = SamplerConfig::default().with_buffer_size(2);
        let sampler = IdChainSampler::new(config);

        assert_eq!(sampler.add_paths(&paths()), 2);
        assert_eq!(sampler.add_paths(&[vec![99, 100]]), 0);
        assert_eq!(sampler.paths_loaded(), 2);
        assert!(!sampler.with_topology(|g| g.contains(&10)));
    }

    #[test]
    fn test_fixed_strategy_returns_representative() {
        let sampler = sampler(SamplingStrategy::Fixed);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..10 {
            let chain = sampler.sample_chain(&mut rng, 4).unwrap();
            assert_eq!(chain.as_slice(), &[1, 2, 3, 4]);
        }
        let short = sampler.sample_chain(&mut rng, 2).unwrap();
        assert_eq!(short.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_random_walk_follows_relationships() {
        let sampler = sampler(SamplingStrategy::RandomWalk);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..50 {
            let chain = sampler.sample_chain(&mut rng, 0).unwrap();
            let first = *chain.first().unwrap();
            assert!(first == 1 || first == 10);
            sampler.with_topology(|g| {
                for pair in chain.as_slice().windows(2) {
                    assert!(g.direct_children(&pair[0]).contains(&pair[1]));
                }
            });
        }
    }

    #[test]
    fn test_random_walk_is_reproducible_with_seed() {
        let sampler = sampler(SamplingStrategy::RandomWalk);
        let mut a = StdRng::seed_from_u64(5);
        let mut b = StdRng::seed_from_u64(5);

        for _ in 0..20 {
            assert_eq!(
                sampler.sample_chain(&mut a, 4).unwrap(),
                sampler.sample_chain(&mut b, 4).unwrap()
            );
        }
    }

    #[test]
    fn test_random_walk_survives_cycles() {
        let config = SamplerConfig::default().with_strategy(SamplingStrategy::RandomWalk);
        let sampler = IdChainSampler::from_paths(config, &[vec!["a", "b", "c", "a"]]);
        let mut rng = StdRng::seed_from_u64(2);

        let chain = sampler.sample_chain(&mut rng, 10).unwrap();
        assert_eq!(chain.as_slice(), &["a", "b", "c"]);
    }

    #[test]
    fn test_uniform_path_picks_enumerated_paths() {
        let sampler = sampler(SamplingStrategy::UniformPath);
        let mut rng = StdRng::seed_from_u64(8);
        let expected = paths();

        let mut seen = HashSet::new();
        for _ in 0..100 {
            let chain = sampler.sample_chain(&mut rng, 0).unwrap();
            assert!(expected.contains(&chain.clone().into_inner()));
            seen.insert(chain.into_inner());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_id_at_depth() {
        let sampler = sampler(SamplingStrategy::Fixed);
        let mut rng = StdRng::seed_from_u64(4);

        assert_eq!(sampler.id_at_depth(&mut rng, 0), Some(1));
        assert_eq!(sampler.id_at_depth(&mut rng, 2), Some(3));
        assert_eq!(sampler.id_at_depth(&mut rng, 9), None);
        assert_eq!(sampler.vid(&mut rng), Some(4));
    }

    #[test]
    fn test_clear() {
        let sampler = sampler(SamplingStrategy::RandomWalk);
        sampler.clear();
        assert!(!sampler.ids_exist());
        assert_eq!(sampler.initial_depth(), 0);
        assert_eq!(sampler.paths_loaded(), 0);
    }
}
