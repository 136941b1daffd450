//! Observability sinks fed by the scheduler.

use crate::config::Phase;
use crate::metrics::MetricsSnapshot;
use crate::status::WorkloadStatus;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, trace};

/// How a single call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Error,
}

/// Receives counters, timers and status changes from a running scheduler.
pub trait MetricsSink: Send + Sync {
    /// Called once per call that finished with an outcome.
    fn record_call(&self, phase: Phase, outcome: CallOutcome, duration: Duration);

    /// Called on every status transition.
    fn record_status(&self, phase: Phase, status: WorkloadStatus);

    /// Called every progress interval while the run is active.
    fn progress(&self, phase: Phase, snapshot: &MetricsSnapshot);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record_call(&self, _phase: Phase, _outcome: CallOutcome, _duration: Duration) {}

    fn record_status(&self, _phase: Phase, _status: WorkloadStatus) {}

    fn progress(&self, _phase: Phase, _snapshot: &MetricsSnapshot) {}
}

/// Logs progress and status changes through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record_call(&self, phase: Phase, outcome: CallOutcome, duration: Duration) {
        trace!(%phase, ?outcome, duration_us = duration.as_micros() as u64, "call finished");
    }

    fn record_status(&self, phase: Phase, status: WorkloadStatus) {
        info!(%phase, %status, "Workload status changed");
    }

    fn progress(&self, phase: Phase, snapshot: &MetricsSnapshot) {
        info!(
            "[{phase}] {:.0}s elapsed: {} ok, {} errors, {} pending, {:.1} calls/s (target {:.1}, {:+.1}%)",
            snapshot.elapsed_secs,
            snapshot.success,
            snapshot.errors,
            snapshot.pending,
            snapshot.calls_per_second,
            snapshot.target_qps,
            snapshot.cps_diff_pct
        );
    }
}
