//! Warmup and measurement orchestration.

use crate::config::{Phase, WorkloadConfig};
use crate::error::SchedulerError;
use crate::report::RunSummary;
use crate::scheduler::RateScheduler;
use crate::sink::MetricsSink;
use crate::status::WorkloadStatus;
use crate::workload::Workload;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Summaries of every session a runner executed.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub warmup: Option<RunSummary>,
    pub measurement: Option<RunSummary>,
}

impl RunReport {
    /// Status of the last session that ran.
    pub fn final_status(&self) -> Option<WorkloadStatus> {
        self.measurement
            .as_ref()
            .or(self.warmup.as_ref())
            .map(|summary| summary.status)
    }

    /// Whether the measurement session ran to completion.
    pub fn passed(&self) -> bool {
        self.measurement
            .as_ref()
            .is_some_and(RunSummary::is_completed)
    }

    /// The summaries in execution order.
    pub fn summaries(&self) -> impl Iterator<Item = &RunSummary> {
        self.warmup.iter().chain(self.measurement.iter())
    }
}

/// Runs an optional warmup session followed by the measurement session.
///
/// Each session gets a fresh [`RateScheduler`], so warmup calls never show up
/// in the measurement metrics.
pub struct WorkloadRunner<W: Workload> {
    config: WorkloadConfig,
    workload: Arc<W>,
    sink: Arc<dyn MetricsSink>,
    current: Mutex<Option<Arc<RateScheduler<W>>>>,
    shutdown_requested: AtomicBool,
}

impl<W: Workload> WorkloadRunner<W> {
    pub fn new(config: WorkloadConfig, workload: Arc<W>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            workload,
            sink,
            current: Mutex::new(None),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Run every configured session.
    ///
    /// A warmup that does not complete skips the measurement session.
    pub async fn run(&self) -> Result<RunReport, SchedulerError> {
        self.config.validate()?;
        let mut report = RunReport::default();

        if self.config.warmup.is_some() {
            let summary = self.run_phase(Phase::Warmup).await?;
            let completed = summary.is_completed();
            report.warmup = Some(summary);
            if !completed {
                warn!("Warmup ended without completing; skipping measurement");
                return Ok(report);
            }
        }

        if self.shutdown_requested.load(Ordering::Acquire) {
            return Ok(report);
        }
        report.measurement = Some(self.run_phase(Phase::Measurement).await?);
        Ok(report)
    }

    /// Stop the session in progress and skip any that have not started.
    pub async fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(scheduler) = current {
            scheduler.shutdown().await;
        }
    }

    async fn run_phase(&self, phase: Phase) -> Result<RunSummary, SchedulerError> {
        let scheduler = Arc::new(RateScheduler::new(
            self.config.clone(),
            phase,
            Arc::clone(&self.workload),
            Arc::clone(&self.sink),
        )?);
        self.set_current(Some(Arc::clone(&scheduler)));
        let result = self.drive(&scheduler).await;
        self.set_current(None);
        result?;

        let summary = scheduler.summary();
        info!(
            "{phase} run of {} finished as {}: {} ok, {} errors, {:.1} calls/s",
            summary.workload,
            summary.status,
            summary.metrics.success,
            summary.metrics.errors,
            summary.metrics.calls_per_second
        );
        Ok(summary)
    }

    async fn drive(&self, scheduler: &RateScheduler<W>) -> Result<(), SchedulerError> {
        if self.shutdown_requested.load(Ordering::Acquire) {
            scheduler.shutdown().await;
            return Ok(());
        }

        let started = match scheduler.prepare().await {
            Ok(()) => scheduler.start(),
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            // a concurrent shutdown moved the scheduler out of its start path
            if self.shutdown_requested.load(Ordering::Acquire) {
                scheduler.shutdown().await;
                return Ok(());
            }
            return Err(e);
        }

        match scheduler.await_termination().await {
            Ok(_) => Ok(()),
            Err(SchedulerError::PostProcess(message)) => {
                warn!("Post-process failed after {} run: {message}", scheduler.phase());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn set_current(&self, scheduler: Option<Arc<RateScheduler<W>>>) {
        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = scheduler;
    }
}
