//! Rate-paced dispatch of a [`Workload`].
//!
//! A scheduler owns one session (warmup or measurement). `scheduler_tasks`
//! pacing tasks each dispatch at `target / scheduler_tasks` calls per second.
//! Every dispatch takes a permit from a semaphore of `worker_tasks` permits, so
//! at most that many calls are in flight. A monitor task ends the session when
//! the run duration expires or an abort condition holds.

use crate::config::{Phase, WorkloadConfig};
use crate::error::{SchedulerError, WorkloadError};
use crate::metrics::{deviation_pct, CallGuard, MetricsSnapshot, RunMetrics};
use crate::report::RunSummary;
use crate::sink::{CallOutcome, MetricsSink};
use crate::status::{AbortReason, WorkloadStatus};
use crate::workload::Workload;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Dispatch deadlines further behind than this are dropped instead of replayed.
const MAX_DISPATCH_LAG: Duration = Duration::from_millis(100);

/// Slack added on top of the expected run end before `await_termination` gives up.
const TERMINATION_GRACE: Duration = Duration::from_secs(1);

/// Drives a workload at a target rate for one session.
pub struct RateScheduler<W: Workload> {
    inner: Arc<Inner<W>>,
}

struct Inner<W: Workload> {
    phase: Phase,
    config: WorkloadConfig,
    run_duration: Duration,
    workload: Arc<W>,
    sink: Arc<dyn MetricsSink>,
    metrics: RunMetrics,
    status: watch::Sender<WorkloadStatus>,
    abort_reason: Mutex<Option<AbortReason>>,
    post_process_error: Mutex<Option<String>>,
    /// Stops the pacing tasks and the monitor.
    stop_dispatch: CancellationToken,
    /// Drops calls that are still running after the shutdown timeout.
    cancel_calls: CancellationToken,
    error_signal: Notify,
    workers: Arc<Semaphore>,
    in_flight: TaskTracker,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    prepared: AtomicBool,
    post_processed: AtomicBool,
}

impl<W: Workload> RateScheduler<W> {
    /// Create a scheduler for one session of `workload`.
    pub fn new(
        config: WorkloadConfig,
        phase: Phase,
        workload: Arc<W>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let run_duration = config.run_duration(phase);
        if run_duration.is_zero() {
            return Err(SchedulerError::Config(format!(
                "{phase} duration must be greater than zero"
            )));
        }

        let (status, _) = watch::channel(WorkloadStatus::Initialized);
        let inner = Inner {
            phase,
            run_duration,
            workload,
            sink,
            metrics: RunMetrics::new(config.max_retained_errors),
            status,
            abort_reason: Mutex::new(None),
            post_process_error: Mutex::new(None),
            stop_dispatch: CancellationToken::new(),
            cancel_calls: CancellationToken::new(),
            error_signal: Notify::new(),
            workers: Arc::new(Semaphore::new(config.worker_tasks)),
            in_flight: TaskTracker::new(),
            dispatchers: Mutex::new(Vec::new()),
            prepared: AtomicBool::new(false),
            post_processed: AtomicBool::new(false),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.inner.config
    }

    pub fn status(&self) -> WorkloadStatus {
        *self.inner.status.borrow()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<WorkloadStatus> {
        self.inner.status.subscribe()
    }

    /// Run the workload's pre-run validation and move to `CanRun`.
    pub async fn prepare(&self) -> Result<(), SchedulerError> {
        let status = self.status();
        if status != WorkloadStatus::Initialized {
            return Err(SchedulerError::InvalidTransition {
                from: status,
                to: WorkloadStatus::CanRun,
            });
        }
        if let Err(e) = self.inner.workload.pre_process().await {
            error!(
                "Pre-process for {} ({}) failed: {e:#}",
                self.inner.workload.name(),
                self.inner.phase
            );
            return Err(SchedulerError::PreProcess(format!("{e:#}")));
        }
        self.inner.prepared.store(true, Ordering::Release);
        self.inner.transition(WorkloadStatus::CanRun)
    }

    /// Begin dispatching and return immediately.
    ///
    /// Must be called from within a Tokio runtime after [`prepare`](Self::prepare).
    pub fn start(&self) -> Result<(), SchedulerError> {
        let status = self.status();
        if status != WorkloadStatus::CanRun {
            return Err(SchedulerError::NotReady(status));
        }
        let inner = &self.inner;
        inner.transition(WorkloadStatus::PendingRun)?;
        inner.metrics.mark_started();
        inner.transition(WorkloadStatus::Running)?;

        info!(
            "Starting {} run of {}: target {}, duration {:?}, {} scheduler task(s), {} worker(s)",
            inner.phase,
            inner.workload.name(),
            inner.config.target,
            inner.run_duration,
            inner.config.scheduler_tasks,
            inner.config.worker_tasks
        );

        let mut dispatchers = inner
            .dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for index in 0..inner.config.scheduler_tasks {
            dispatchers.push(tokio::spawn(dispatch_loop(Arc::clone(inner), index)));
        }
        tokio::spawn(monitor(Arc::clone(inner)));
        Ok(())
    }

    /// Stop dispatch, drain in-flight calls and move to `Shutdown`.
    ///
    /// Safe to call any number of times and from several tasks at once. A run
    /// that already completed or aborted keeps its final status.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.transition(WorkloadStatus::PendingShutdown).is_err() {
            if self.status() == WorkloadStatus::PendingShutdown {
                let mut rx = inner.status.subscribe();
                let _ = rx.wait_for(|s| *s == WorkloadStatus::Shutdown).await;
            }
            return;
        }

        info!("Shutting down {} run of {}", inner.phase, inner.workload.name());
        inner.stop_dispatch.cancel();
        inner.drain().await;
        if inner.metrics.started_at().is_some() {
            inner.metrics.mark_completed();
        }
        inner.run_post_process().await;
        if let Err(e) = inner.transition(WorkloadStatus::Shutdown) {
            debug!("{e}");
        }
    }

    /// Wait until the run reaches `Completed`, `Aborted` or `Shutdown`.
    ///
    /// Waits for the remaining run time, one check interval, the shutdown
    /// timeout and a second of slack, then forces a shutdown. Returns
    /// [`SchedulerError::PostProcess`] when the run ended but its post-process
    /// hook failed; the final status is still available from [`status`](Self::status).
    pub async fn await_termination(&self) -> Result<WorkloadStatus, SchedulerError> {
        let status = self.status();
        if matches!(status, WorkloadStatus::Initialized | WorkloadStatus::CanRun) {
            return Err(SchedulerError::NotReady(status));
        }

        let config = &self.inner.config;
        let budget = self.remaining_time()
            + config.check_interval
            + config.shutdown_timeout
            + TERMINATION_GRACE;
        let mut rx = self.inner.status.subscribe();
        let waited = time::timeout(budget, rx.wait_for(|s| s.is_terminal()))
            .await
            .map(|r| r.map(|s| *s));

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(_)) => self.status(),
            Err(_) => {
                warn!(
                    "{} run of {} did not terminate within {budget:?}; forcing shutdown",
                    self.inner.phase,
                    self.inner.workload.name()
                );
                self.inner.cancel_calls.cancel();
                self.shutdown().await;
                self.status()
            }
        };

        match self.post_process_error() {
            Some(message) => Err(SchedulerError::PostProcess(message)),
            None => Ok(status),
        }
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.inner.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.snapshot()
    }

    pub fn calls_per_second(&self) -> f64 {
        self.inner.metrics.calls_per_second()
    }

    pub fn errors_per_second(&self) -> f64 {
        self.inner.metrics.errors_per_second()
    }

    /// Achieved rate relative to the current target, in percent.
    pub fn cps_diff_pct(&self) -> f64 {
        self.inner.snapshot().cps_diff_pct
    }

    /// Configured length of this session.
    pub fn target_run_duration(&self) -> Duration {
        self.inner.run_duration
    }

    /// Time left until the session expires; zero once it has terminated.
    pub fn remaining_time(&self) -> Duration {
        if self.status().is_terminal() {
            return Duration::ZERO;
        }
        self.inner
            .run_duration
            .saturating_sub(self.inner.metrics.elapsed())
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.inner.metrics.started_at()
    }

    pub fn completion_time(&self) -> Option<DateTime<Utc>> {
        self.inner.metrics.completed_at()
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.inner
            .abort_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn post_process_error(&self) -> Option<String> {
        self.inner
            .post_process_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Aggregate counters, rates and outcome of the session.
    pub fn summary(&self) -> RunSummary {
        let inner = &self.inner;
        RunSummary {
            workload: inner.workload.name().to_string(),
            phase: inner.phase,
            status: self.status(),
            abort_reason: self.abort_reason().map(|r| r.to_string()),
            target: inner.config.target.to_string(),
            target_run_duration_secs: inner.run_duration.as_secs_f64(),
            started_at: self.start_time(),
            completed_at: self.completion_time(),
            metrics: inner.snapshot(),
            avg_latency_ms: inner
                .metrics
                .avg_success_latency()
                .map(|d| d.as_secs_f64() * 1000.0),
            errors: inner.metrics.retained_errors(),
            post_process_error: self.post_process_error(),
        }
    }

    /// Render the summary table to stdout.
    pub fn print_summary(&self) {
        println!("{}", self.summary().format_table());
    }
}

impl<W: Workload> Drop for RateScheduler<W> {
    fn drop(&mut self) {
        self.inner.stop_dispatch.cancel();
    }
}

impl<W: Workload> Inner<W> {
    /// Apply a transition if the state machine allows it.
    fn transition(&self, next: WorkloadStatus) -> Result<(), SchedulerError> {
        let mut result = Ok(());
        self.status.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                result = Err(SchedulerError::InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });
        if result.is_ok() {
            debug!(phase = %self.phase, status = %next, "status transition");
            self.sink.record_status(self.phase, next);
        }
        result
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let target = self.config.target.qps_at(self.metrics.elapsed());
        self.metrics.snapshot(target)
    }

    fn error_threshold_exceeded(&self) -> Option<AbortReason> {
        let errors = self.metrics.error_count();
        (errors > self.config.error_abort_threshold).then_some(AbortReason::ErrorThreshold {
            errors,
            threshold: self.config.error_abort_threshold,
        })
    }

    async fn execute_call(&self) {
        let guard = self.metrics.begin_call();

        let prepared = tokio::select! {
            biased;
            _ = self.cancel_calls.cancelled() => return,
            prepared = self.workload.pre_call() => prepared,
        };
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(WorkloadError::Interrupted) => return,
            Err(WorkloadError::Failed(e)) => {
                self.record_failure(guard, Duration::ZERO, &e);
                return;
            }
        };

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel_calls.cancelled() => return,
            outcome = self.workload.call(prepared) => outcome,
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(()) => {
                guard.success(elapsed);
                self.sink
                    .record_call(self.phase, CallOutcome::Success, elapsed);
            }
            Err(WorkloadError::Interrupted) => return,
            Err(WorkloadError::Failed(e)) => self.record_failure(guard, elapsed, &e),
        }

        self.workload.post_call().await;
    }

    fn record_failure(&self, guard: CallGuard<'_>, elapsed: Duration, err: &anyhow::Error) {
        let message = format!("{err:#}");
        debug!("Call failed: {message}");
        guard.error(elapsed, message);
        self.sink.record_call(self.phase, CallOutcome::Error, elapsed);
        if self.metrics.error_count() > self.config.error_abort_threshold {
            self.error_signal.notify_one();
        }
    }

    /// End a running session, as completed or aborted.
    async fn finish(&self, reason: Option<AbortReason>) {
        if self.transition(WorkloadStatus::WaitingCompletion).is_err() {
            return;
        }
        match &reason {
            Some(reason) => {
                warn!("Aborting {} run of {}: {reason}", self.phase, self.workload.name());
                *self
                    .abort_reason
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
            }
            None => info!(
                "{} run of {} reached its duration of {:?}",
                self.phase,
                self.workload.name(),
                self.run_duration
            ),
        }

        self.stop_dispatch.cancel();
        self.drain().await;
        self.metrics.mark_completed();
        self.run_post_process().await;

        let final_status = if reason.is_some() {
            WorkloadStatus::Aborted
        } else {
            WorkloadStatus::Completed
        };
        if let Err(e) = self.transition(final_status) {
            debug!("Run was shut down while finishing: {e}");
        }
    }

    /// Wait for the pacing tasks to stop and the in-flight calls to finish.
    ///
    /// Calls still running after `shutdown_timeout` are cancelled.
    async fn drain(&self) {
        let dispatchers = std::mem::take(
            &mut *self
                .dispatchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in dispatchers {
            if let Err(e) = handle.await {
                error!("Dispatch task failed: {e}");
            }
        }

        self.in_flight.close();
        let pending = self.metrics.pending_count();
        if pending > 0 {
            info!("Waiting for {pending} in-flight call(s) to finish");
        }
        if time::timeout(self.config.shutdown_timeout, self.in_flight.wait())
            .await
            .is_err()
        {
            warn!(
                "{} call(s) still running after {:?}; cancelling",
                self.metrics.pending_count(),
                self.config.shutdown_timeout
            );
            self.cancel_calls.cancel();
            self.in_flight.wait().await;
        }
    }

    async fn run_post_process(&self) {
        if !self.prepared.load(Ordering::Acquire) {
            return;
        }
        if self.post_processed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.workload.post_process().await {
            error!(
                "Post-process for {} ({}) failed: {e:#}",
                self.workload.name(),
                self.phase
            );
            *self
                .post_process_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(format!("{e:#}"));
        }
    }
}

/// Paces dispatch for one scheduler task.
async fn dispatch_loop<W: Workload>(inner: Arc<Inner<W>>, index: usize) {
    let share = inner.config.scheduler_tasks as f64;
    let mut deadline = time::Instant::now();
    let mut dispatched: u64 = 0;

    loop {
        let rate = inner.config.target.qps_at(inner.metrics.elapsed()) / share;
        deadline += dispatch_interval(rate, inner.run_duration);
        let now = time::Instant::now();
        if now.saturating_duration_since(deadline) > MAX_DISPATCH_LAG {
            deadline = now;
        }

        tokio::select! {
            biased;
            _ = inner.stop_dispatch.cancelled() => break,
            _ = time::sleep_until(deadline) => {}
        }

        let permit = tokio::select! {
            biased;
            _ = inner.stop_dispatch.cancelled() => break,
            permit = Arc::clone(&inner.workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let call = Arc::clone(&inner);
        inner.in_flight.spawn(async move {
            call.execute_call().await;
            drop(permit);
        });
        dispatched += 1;
    }

    debug!(phase = %inner.phase, index, dispatched, "dispatch task stopped");
}

/// Time between dispatches at `rate` calls/s, never longer than `cap`.
fn dispatch_interval(rate: f64, cap: Duration) -> Duration {
    Duration::try_from_secs_f64(1.0 / rate).map_or(cap, |interval| interval.min(cap))
}

enum Wake {
    Tick,
    Errors,
    Expired,
}

/// Ends the session on expiry or abort and emits progress.
async fn monitor<W: Workload>(inner: Arc<Inner<W>>) {
    let config = &inner.config;
    let expires_at =
        time::Instant::now() + inner.run_duration.saturating_sub(inner.metrics.elapsed());
    let mut ticker = time::interval(config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let track_deviation = config.target.is_ramp();
    let mut window: Option<(Instant, u64)> = None;
    let mut windows_seen: u32 = 0;
    let mut deviating_checks: u32 = 0;
    let mut last_progress = Instant::now();

    loop {
        let wake = tokio::select! {
            biased;
            _ = inner.stop_dispatch.cancelled() => return,
            _ = time::sleep_until(expires_at) => Wake::Expired,
            _ = inner.error_signal.notified() => Wake::Errors,
            _ = ticker.tick() => Wake::Tick,
        };

        if let Some(reason) = inner.error_threshold_exceeded() {
            inner.finish(Some(reason)).await;
            return;
        }
        if matches!(wake, Wake::Expired) || inner.metrics.elapsed() >= inner.run_duration {
            inner.finish(None).await;
            return;
        }
        if !matches!(wake, Wake::Tick) {
            continue;
        }

        if let (true, Some(limit)) = (track_deviation, config.qps_deviation_abort_pct) {
            let now = Instant::now();
            let completed = inner.metrics.completed_calls();
            if let Some((since, base)) = window {
                let secs = now.duration_since(since).as_secs_f64();
                windows_seen += 1;
                if secs > 0.0 && windows_seen > 1 {
                    let achieved = completed.saturating_sub(base) as f64 / secs;
                    let target = config.target.qps_at(inner.metrics.elapsed());
                    let pct = deviation_pct(achieved, target);
                    debug!(
                        phase = %inner.phase,
                        achieved,
                        target,
                        deviation_pct = pct,
                        "rate check"
                    );
                    if pct.abs() > limit {
                        deviating_checks += 1;
                    } else {
                        deviating_checks = 0;
                    }
                    if deviating_checks >= config.deviation_checks {
                        let reason = AbortReason::QpsDeviation {
                            deviation_pct: pct,
                            threshold_pct: limit,
                            checks: deviating_checks,
                        };
                        inner.finish(Some(reason)).await;
                        return;
                    }
                }
            }
            window = Some((now, completed));
        }

        if last_progress.elapsed() >= config.progress_interval {
            inner.sink.progress(inner.phase, &inner.snapshot());
            last_progress = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NoopSink;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;

    struct Counting {
        calls: AtomicU64,
    }

    #[async_trait]
    impl Workload for Counting {
        type Prepared = ();

        fn name(&self) -> &str {
            "counting"
        }

        async fn pre_call(&self) -> Result<(), WorkloadError> {
            Ok(())
        }

        async fn call(&self, _prepared: ()) -> Result<(), WorkloadError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn scheduler(config: WorkloadConfig) -> RateScheduler<Counting> {
        let workload = Arc::new(Counting {
            calls: AtomicU64::new(0),
        });
        RateScheduler::new(config, Phase::Measurement, workload, Arc::new(NoopSink)).unwrap()
    }

    #[test]
    fn test_dispatch_interval() {
        let cap = Duration::from_secs(60);
        assert_eq!(dispatch_interval(4.0, cap), Duration::from_millis(250));
        assert_eq!(dispatch_interval(1e-20, cap), cap);
        assert_eq!(dispatch_interval(0.0, cap), cap);
        assert_eq!(dispatch_interval(f64::MIN_POSITIVE, cap), cap);
    }

    #[tokio::test]
    async fn test_tiny_rate_run_completes() {
        let config = WorkloadConfig::new(1e-20, Duration::from_millis(200))
            .with_check_interval(Duration::from_millis(50))
            .with_shutdown_timeout(Duration::from_millis(200));
        let scheduler = scheduler(config);
        scheduler.prepare().await.unwrap();
        scheduler.start().unwrap();

        let status = scheduler.await_termination().await.unwrap();
        assert_eq!(status, WorkloadStatus::Completed);
        assert!(scheduler.metrics().success_count() <= 1);
    }

    #[test]
    fn test_zero_warmup_is_rejected() {
        let workload = Arc::new(Counting {
            calls: AtomicU64::new(0),
        });
        let result = RateScheduler::new(
            WorkloadConfig::new(10.0, Duration::from_secs(1)),
            Phase::Warmup,
            workload,
            Arc::new(NoopSink),
        );
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_requires_prepare() {
        let scheduler = scheduler(WorkloadConfig::new(10.0, Duration::from_secs(1)));
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::NotReady(WorkloadStatus::Initialized))
        ));
        assert!(matches!(
            scheduler.await_termination().await,
            Err(SchedulerError::NotReady(WorkloadStatus::Initialized))
        ));
    }

    #[tokio::test]
    async fn test_prepare_twice_is_rejected() {
        let scheduler = scheduler(WorkloadConfig::new(10.0, Duration::from_secs(1)));
        scheduler.prepare().await.unwrap();
        assert_eq!(scheduler.status(), WorkloadStatus::CanRun);
        assert!(matches!(
            scheduler.prepare().await,
            Err(SchedulerError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_remaining_time_before_start() {
        let scheduler = scheduler(WorkloadConfig::new(10.0, Duration::from_secs(5)));
        assert_eq!(scheduler.remaining_time(), Duration::from_secs(5));
        assert_eq!(scheduler.target_run_duration(), Duration::from_secs(5));
        assert!(scheduler.start_time().is_none());
    }

    #[tokio::test]
    async fn test_short_fixed_run_completes() {
        let config = WorkloadConfig::new(200.0, Duration::from_millis(300))
            .with_check_interval(Duration::from_millis(20));
        let scheduler = scheduler(config);
        scheduler.prepare().await.unwrap();
        scheduler.start().unwrap();

        let status = scheduler.await_termination().await.unwrap();
        assert_eq!(status, WorkloadStatus::Completed);
        assert!(scheduler.metrics().success_count() > 0);
        assert_eq!(scheduler.metrics().pending_count(), 0);
        assert_eq!(scheduler.remaining_time(), Duration::ZERO);
        assert!(scheduler.completion_time().is_some());
    }
}
