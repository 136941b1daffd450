//! Resolving one compiled template against many sampled chains.

use loadtest_sampler::{IdChainSampler, SamplerConfig, SamplingStrategy};
use loadtest_template::QueryTemplate;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sampler() -> IdChainSampler<String> {
    let paths: Vec<Vec<String>> = (0..20)
        .map(|i| (0..5).map(|hop| format!("v{i}_{hop}")).collect())
        .collect();
    let config = SamplerConfig::default().with_strategy(SamplingStrategy::RandomWalk);
    IdChainSampler::from_paths(config, &paths)
}

#[test]
fn test_template_serves_many_chains_without_recompiling() {
    let sampler = sampler();
    let template =
        QueryTemplate::compile("g.V('%s').out().out().hasId('%3$s').in().hasId('%-1$s')").unwrap();
    let mut rng = StdRng::seed_from_u64(99);

    assert_eq!(template.chain_length(), 3);
    let length = template.chain_length_for(sampler.depth());
    assert_eq!(length, 5);
    for _ in 0..200 {
        let chain = sampler.sample_chain(&mut rng, length).unwrap();
        let ids = template.get_ids(&chain);
        assert_eq!(ids.len(), 3);

        let root = ids[0].clone().unwrap();
        let prefix = root.trim_end_matches("_0");
        assert_eq!(ids[1].as_deref(), Some(format!("{prefix}_2").as_str()));
        assert_eq!(ids[2].as_deref(), Some(format!("{prefix}_4").as_str()));

        let query = template.render(&chain);
        assert_eq!(
            query,
            format!("g.V('{root}').out().out().hasId('{prefix}_2').in().hasId('{prefix}_4')")
        );
    }
    assert_eq!(
        template.format(),
        "g.V('%1$s').out().out().hasId('%3$s').in().hasId('%-1$s')"
    );
}

#[test]
fn test_depth_up_follows_actual_chain_length() {
    let sampler = sampler();
    let template = QueryTemplate::compile("%1$s -> %-1$s").unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    for length in 1..=8 {
        let chain = sampler.sample_chain(&mut rng, length).unwrap();
        let expected_len = length.min(5);
        assert_eq!(chain.len(), expected_len);

        let ids = template.get_ids(&chain);
        assert_eq!(ids[1].as_ref(), chain.position(expected_len));
    }
}

#[test]
fn test_depth_up_reaches_bottom_of_fixed_chain() {
    let config = SamplerConfig::default().with_strategy(SamplingStrategy::Fixed);
    let path: Vec<String> = ["a", "b", "c", "d"].iter().map(|id| id.to_string()).collect();
    let sampler = IdChainSampler::from_paths(config, &[path]);
    let template = QueryTemplate::compile("g.V(%s).out().hasId(%-1$s).in().hasId(%-2$s)").unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    let chain = sampler
        .sample_chain(&mut rng, template.chain_length_for(sampler.depth()))
        .unwrap();
    assert_eq!(
        template.render(&chain),
        "g.V(a).out().hasId(d).in().hasId(c)"
    );
}
