//! Id chain sampling for graph load tests.
//!
//! An [`IdChainSampler`] owns one [`IdTopologyGraph`] filled from bulk-loaded
//! id paths (from a live query or a fixed seed set) and hands out owned
//! [`IdChain`] snapshots that query templates resolve their arguments from.
//!
//! # Example
//!
//! ```rust
//! use loadtest_sampler::{IdChainSampler, SamplerConfig, SamplingStrategy};
//! use rand::SeedableRng;
//!
//! let config = SamplerConfig::default().with_strategy(SamplingStrategy::RandomWalk);
//! let sampler = IdChainSampler::new(config);
//! sampler.add_paths(&[vec![1u64, 2, 3], vec![1, 4, 5]]);
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let chain = sampler.sample_chain(&mut rng, 3).unwrap();
//! assert_eq!(chain.position(1), Some(&1));
//! assert_eq!(chain.len(), 3);
//! ```
//!
//! [`IdTopologyGraph`]: loadtest_topology::IdTopologyGraph

pub mod chain;
pub mod config;
pub mod error;
pub mod sampler;

pub use chain::IdChain;
pub use config::{SamplerConfig, SamplingStrategy};
pub use error::SamplerError;
pub use sampler::IdChainSampler;
