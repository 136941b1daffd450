//! Configuration types for id sampling.

use crate::error::SamplerError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a fresh chain is picked for each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Always hand out the representative chain.
    Fixed,
    /// Random walk from a random marked top-level parent.
    #[default]
    RandomWalk,
    /// Uniform pick among every enumerated top-level path.
    UniformPath,
}

impl SamplingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SamplingStrategy::Fixed => "fixed",
            SamplingStrategy::RandomWalk => "random_walk",
            SamplingStrategy::UniformPath => "uniform_path",
        }
    }
}

impl FromStr for SamplingStrategy {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed" => Ok(SamplingStrategy::Fixed),
            "random_walk" | "random" => Ok(SamplingStrategy::RandomWalk),
            "uniform_path" | "uniform" => Ok(SamplingStrategy::UniformPath),
            other => Err(SamplerError::UnknownStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Sampler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Strategy used by `sample_chain`.
    #[serde(default)]
    pub strategy: SamplingStrategy,
    /// Maximum number of id paths held by the sampler.
    pub buffer_size: usize,
    /// Hop bound used when enumerating paths and walking without a target length.
    pub max_path_depth: usize,
    /// Seed for reproducible sampling (random when absent).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::default(),
            buffer_size: 10_000,
            max_path_depth: 16,
            seed: None,
        }
    }
}

impl SamplerConfig {
    pub fn with_strategy(mut self, strategy: SamplingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_max_path_depth(mut self, max_path_depth: usize) -> Self {
        self.max_path_depth = max_path_depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the RNG callers should pass to the sampler.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
