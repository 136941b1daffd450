//! Sampling from many threads while paths keep loading.

use loadtest_sampler::{IdChainSampler, SamplerConfig, SamplingStrategy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn chain_paths(prefix: u64, count: u64) -> Vec<Vec<u64>> {
    (0..count)
        .map(|i| {
            let root = prefix * 1_000_000 + i * 10;
            vec![root, root + 1, root + 2, root + 3]
        })
        .collect()
}

#[test]
fn test_concurrent_readers_and_writer() {
    let config = SamplerConfig::default()
        .with_strategy(SamplingStrategy::RandomWalk)
        .with_buffer_size(100_000);
    let sampler = Arc::new(IdChainSampler::from_paths(config, &chain_paths(0, 100)));

    std::thread::scope(|scope| {
        let writer = Arc::clone(&sampler);
        scope.spawn(move || {
            for batch in 1..=20 {
                writer.add_paths(&chain_paths(batch, 50));
            }
        });

        for worker in 0..8 {
            let reader = Arc::clone(&sampler);
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker);
                for _ in 0..500 {
                    let chain = reader.sample_chain(&mut rng, 4).unwrap();
                    assert_eq!(chain.len(), 4);
                    let root = *chain.first().unwrap();
                    assert_eq!(chain.as_slice(), &[root, root + 1, root + 2, root + 3]);
                }
            });
        }
    });

    assert_eq!(sampler.paths_loaded(), 100 + 20 * 50);
    assert_eq!(sampler.id_count(), (100 + 20 * 50) * 4);
    assert_eq!(sampler.relationship_count(), (100 + 20 * 50) * 3);
}

#[test]
fn test_uniform_cache_refreshes_after_load() {
    let config = SamplerConfig::default()
        .with_strategy(SamplingStrategy::UniformPath)
        .with_seed(1);
    let sampler = IdChainSampler::from_paths(config.clone(), &[vec![1u64, 2]]);
    let mut rng = config.rng();

    assert_eq!(sampler.sample_chain(&mut rng, 0).unwrap().as_slice(), &[1, 2]);

    sampler.add_paths(&[vec![7, 8, 9]]);
    let mut saw_new = false;
    for _ in 0..64 {
        if sampler.sample_chain(&mut rng, 0).unwrap().first() == Some(&7) {
            saw_new = true;
        }
    }
    assert!(saw_new);
}
