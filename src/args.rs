//! Command-line arguments for load runs.

use crate::config::duration::parse_duration;
use crate::workload::IdSource;
use crate::Neo4jOpts;
use clap::Args;
use loadtest_framework::{QpsTarget, SchedulerError, WorkloadConfig};
use loadtest_sampler::{SamplerConfig, SamplingStrategy};
use std::path::PathBuf;
use std::time::Duration;

/// Arguments for `graph-loadtest run`.
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub neo4j: Neo4jOpts,

    /// Query template; `%s`, `%N$s` and `%-N$s` are replaced with sampled ids
    #[arg(long, short = 't', env = "LOADTEST_TEMPLATE")]
    pub template: String,

    #[command(flatten)]
    pub ids: IdArgs,

    #[command(flatten)]
    pub rate: RateArgs,

    /// YAML workload configuration; replaces every rate and timing flag
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the measurement summary as JSON to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

/// Where sampled ids come from and how they are sampled.
#[derive(Args, Clone, Debug)]
pub struct IdArgs {
    /// Query returning one id path per row as a list column
    #[arg(long, env = "LOADTEST_ID_QUERY")]
    pub id_query: Option<String>,

    /// Name of the list column returned by the id query
    #[arg(long, default_value = "ids")]
    pub id_column: String,

    /// Inline id path, comma-separated from the top-level parent down (repeatable)
    #[arg(long = "id-path")]
    pub id_paths: Vec<String>,

    /// Id sampling strategy: fixed, random_walk or uniform_path
    #[arg(long, default_value = "random_walk")]
    pub strategy: SamplingStrategy,

    /// Maximum number of id paths kept by the sampler
    #[arg(long, default_value = "10000")]
    pub buffer_size: usize,

    /// Hop bound for path enumeration and random walks
    #[arg(long, default_value = "16")]
    pub max_path_depth: usize,

    /// Random seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Target rate, durations and abort thresholds.
#[derive(Args, Clone, Debug)]
pub struct RateArgs {
    /// Target calls per second (ignored when a ramp is given)
    #[arg(long, default_value = "100")]
    pub qps: f64,

    /// Ramp start rate; enables ramping together with --ramp-end and --ramp-increment
    #[arg(long, requires_all = ["ramp_end", "ramp_increment"])]
    pub ramp_start: Option<f64>,

    /// Rate added every --ramp-step
    #[arg(long)]
    pub ramp_increment: Option<f64>,

    /// Rate at which the ramp stops
    #[arg(long)]
    pub ramp_end: Option<f64>,

    /// Time between ramp increments (e.g. "10s", "1m")
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub ramp_step: Duration,

    /// Abort a ramp when achieved rate deviates from target by more than this percentage
    #[arg(long)]
    pub qps_deviation_pct: Option<f64>,

    /// Consecutive deviating checks before a ramp aborts
    #[arg(long, default_value = "3")]
    pub deviation_checks: u32,

    /// Measurement duration (e.g. "300", "300s", "30m", "1h")
    #[arg(long, short = 'd', default_value = "60s", value_parser = parse_duration)]
    pub duration: Duration,

    /// Warmup duration run before measuring
    #[arg(long, value_parser = parse_duration)]
    pub warmup: Option<Duration>,

    /// Number of pacing tasks
    #[arg(long, default_value = "1")]
    pub scheduler_tasks: usize,

    /// Maximum number of queries in flight
    #[arg(long, default_value = "16")]
    pub workers: usize,

    /// Abort once more than this many queries have failed
    #[arg(long, default_value = "1000")]
    pub error_threshold: u64,

    /// How often abort conditions are checked
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub check_interval: Duration,

    /// How often progress is logged
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub progress_interval: Duration,

    /// How long in-flight queries may run after dispatch stops
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub shutdown_timeout: Duration,
}

impl RunArgs {
    /// Workload configuration from the YAML file or the rate flags.
    pub fn workload_config(&self) -> Result<WorkloadConfig, SchedulerError> {
        let config = match &self.config {
            Some(path) => WorkloadConfig::from_file(path)?,
            None => self.rate.workload_config(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        let mut config = SamplerConfig::default()
            .with_strategy(self.ids.strategy)
            .with_buffer_size(self.ids.buffer_size)
            .with_max_path_depth(self.ids.max_path_depth);
        if let Some(seed) = self.ids.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

impl IdArgs {
    pub fn id_source(&self) -> Option<IdSource> {
        self.id_query.as_ref().map(|query| IdSource {
            query: query.clone(),
            column: self.id_column.clone(),
        })
    }

    /// Inline id paths split on commas, empty entries dropped.
    pub fn inline_paths(&self) -> Vec<Vec<String>> {
        self.id_paths
            .iter()
            .map(|path| {
                path.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|path| !path.is_empty())
            .collect()
    }
}

impl RateArgs {
    pub fn target(&self) -> QpsTarget {
        match (self.ramp_start, self.ramp_increment, self.ramp_end) {
            (Some(start), Some(increment), Some(end)) => QpsTarget::Ramp {
                start,
                increment,
                end,
                step: self.ramp_step,
            },
            _ => QpsTarget::Fixed { qps: self.qps },
        }
    }

    pub fn workload_config(&self) -> WorkloadConfig {
        let mut config = WorkloadConfig::default()
            .with_target(self.target())
            .with_duration(self.duration)
            .with_scheduler_tasks(self.scheduler_tasks)
            .with_worker_tasks(self.workers)
            .with_error_abort_threshold(self.error_threshold)
            .with_deviation_checks(self.deviation_checks)
            .with_check_interval(self.check_interval)
            .with_progress_interval(self.progress_interval)
            .with_shutdown_timeout(self.shutdown_timeout);
        if let Some(warmup) = self.warmup {
            config = config.with_warmup(warmup);
        }
        if let Some(pct) = self.qps_deviation_pct {
            config = config.with_qps_deviation_abort_pct(pct);
        }
        config
    }
}
