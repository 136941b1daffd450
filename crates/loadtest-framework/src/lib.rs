//! Rate-paced load generation framework.
//!
//! This crate drives a [`Workload`] at a target call rate:
//! 1. [`RateScheduler`] paces dispatch across scheduler tasks and bounds the
//!    calls in flight with a worker pool
//! 2. [`RunMetrics`] aggregates success/error/aborted/pending counts and timings
//! 3. The monitor ends the run on expiry, on too many errors, or when a ramp
//!    cannot keep up with its target
//! 4. [`WorkloadRunner`] runs an optional warmup session before measuring
//!
//! # Example
//!
//! ```ignore
//! use loadtest_framework::{TracingSink, WorkloadConfig, WorkloadRunner};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = WorkloadConfig::new(500.0, Duration::from_secs(60))
//!     .with_warmup(Duration::from_secs(10))
//!     .with_worker_tasks(32);
//!
//! let runner = WorkloadRunner::new(config, Arc::new(my_workload), Arc::new(TracingSink));
//! let report = runner.run().await?;
//! for summary in report.summaries() {
//!     println!("{}", summary.format_table());
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod sink;
pub mod status;
pub mod workload;

pub use config::{Phase, QpsTarget, WorkloadConfig};
pub use error::{SchedulerError, WorkloadError};
pub use metrics::{CallGuard, MetricsSnapshot, RunMetrics};
pub use report::RunSummary;
pub use runner::{RunReport, WorkloadRunner};
pub use scheduler::RateScheduler;
pub use sink::{CallOutcome, MetricsSink, NoopSink, TracingSink};
pub use status::{AbortReason, WorkloadStatus};
pub use workload::Workload;
