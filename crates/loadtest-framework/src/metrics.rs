//! Run metrics shared by every in-flight call.
//!
//! Each counter is an independent atomic, so workers update them without a
//! lock. `pending` is the only non-monotonic value: it rises when a call is
//! dispatched and falls when the call's [`CallGuard`] is dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// Counters and timings for one scheduler session.
#[derive(Debug)]
pub struct RunMetrics {
    success: AtomicU64,
    errors: AtomicU64,
    aborted: AtomicU64,
    pending: AtomicU64,
    success_nanos: AtomicU64,
    error_nanos: AtomicU64,
    retained_errors: Mutex<VecDeque<String>>,
    max_retained_errors: usize,
    started: OnceLock<(Instant, DateTime<Utc>)>,
    completed: OnceLock<(Instant, DateTime<Utc>)>,
}

impl RunMetrics {
    pub fn new(max_retained_errors: usize) -> Self {
        Self {
            success: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            success_nanos: AtomicU64::new(0),
            error_nanos: AtomicU64::new(0),
            retained_errors: Mutex::new(VecDeque::with_capacity(max_retained_errors)),
            max_retained_errors,
            started: OnceLock::new(),
            completed: OnceLock::new(),
        }
    }

    /// Count a dispatched call as pending until the returned guard resolves or drops.
    pub fn begin_call(&self) -> CallGuard<'_> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        CallGuard {
            metrics: self,
            resolved: false,
        }
    }

    /// Record the run start. Later calls are ignored.
    pub fn mark_started(&self) {
        let _ = self.started.set((Instant::now(), Utc::now()));
    }

    /// Record the run completion. Later calls are ignored.
    pub fn mark_completed(&self) {
        let _ = self.completed.set((Instant::now(), Utc::now()));
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Calls interrupted before they produced an outcome.
    pub fn aborted_count(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Calls that finished as either success or error.
    pub fn completed_calls(&self) -> u64 {
        self.success_count() + self.error_count()
    }

    /// Accumulated time spent in successful calls.
    pub fn success_duration(&self) -> Duration {
        Duration::from_nanos(self.success_nanos.load(Ordering::Relaxed))
    }

    /// Accumulated time spent in failed calls.
    pub fn error_duration(&self) -> Duration {
        Duration::from_nanos(self.error_nanos.load(Ordering::Relaxed))
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started.get().map(|(_, at)| *at)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed.get().map(|(_, at)| *at)
    }

    /// Time since start, frozen at completion. Zero before the run starts.
    pub fn elapsed(&self) -> Duration {
        let Some((start, _)) = self.started.get() else {
            return Duration::ZERO;
        };
        match self.completed.get() {
            Some((end, _)) => end.saturating_duration_since(*start),
            None => start.elapsed(),
        }
    }

    /// Completed calls per second over the elapsed run time.
    pub fn calls_per_second(&self) -> f64 {
        per_second(self.completed_calls(), self.elapsed())
    }

    pub fn errors_per_second(&self) -> f64 {
        per_second(self.error_count(), self.elapsed())
    }

    /// Mean latency of successful calls.
    pub fn avg_success_latency(&self) -> Option<Duration> {
        let count = self.success_count();
        (count > 0)
            .then(|| Duration::from_nanos(self.success_nanos.load(Ordering::Relaxed) / count))
    }

    /// Most recent error messages, oldest first.
    pub fn retained_errors(&self) -> Vec<String> {
        self.retained_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self, target_qps: f64) -> MetricsSnapshot {
        let calls_per_second = self.calls_per_second();
        MetricsSnapshot {
            success: self.success_count(),
            errors: self.error_count(),
            aborted: self.aborted_count(),
            pending: self.pending_count(),
            success_duration_ms: self.success_duration().as_secs_f64() * 1000.0,
            error_duration_ms: self.error_duration().as_secs_f64() * 1000.0,
            elapsed_secs: self.elapsed().as_secs_f64(),
            calls_per_second,
            errors_per_second: self.errors_per_second(),
            target_qps,
            cps_diff_pct: deviation_pct(calls_per_second, target_qps),
        }
    }

    fn record_success(&self, duration: Duration) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.success_nanos
            .fetch_add(duration_nanos(duration), Ordering::Relaxed);
    }

    fn record_error(&self, duration: Duration, message: String) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.error_nanos
            .fetch_add(duration_nanos(duration), Ordering::Relaxed);
        if self.max_retained_errors == 0 {
            return;
        }
        let mut retained = self
            .retained_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if retained.len() == self.max_retained_errors {
            retained.pop_front();
        }
        retained.push_back(message);
    }
}

/// Tracks one dispatched call.
///
/// Resolving the guard records success or error. Dropping it unresolved
/// counts the call as aborted. Either way `pending` is decremented exactly once.
#[must_use = "dropping the guard immediately counts the call as aborted"]
#[derive(Debug)]
pub struct CallGuard<'a> {
    metrics: &'a RunMetrics,
    resolved: bool,
}

impl CallGuard<'_> {
    pub fn success(mut self, duration: Duration) {
        self.resolved = true;
        self.metrics.record_success(duration);
    }

    pub fn error(mut self, duration: Duration, message: impl Into<String>) {
        self.resolved = true;
        self.metrics.record_error(duration, message.into());
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.metrics.aborted.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.pending.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Serializable copy of the run counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub success: u64,
    pub errors: u64,
    pub aborted: u64,
    pub pending: u64,
    pub success_duration_ms: f64,
    pub error_duration_ms: f64,
    pub elapsed_secs: f64,
    pub calls_per_second: f64,
    pub errors_per_second: f64,
    pub target_qps: f64,
    /// Achieved rate relative to target, in percent (negative when behind).
    pub cps_diff_pct: f64,
}

/// Percentage by which `achieved` differs from `target`.
pub fn deviation_pct(achieved: f64, target: f64) -> f64 {
    if target > 0.0 {
        (achieved - target) / target * 100.0
    } else {
        0.0
    }
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_outcomes() {
        let metrics = RunMetrics::new(10);

        metrics.begin_call().success(Duration::from_millis(4));
        metrics.begin_call().success(Duration::from_millis(6));
        metrics.begin_call().error(Duration::from_millis(1), "boom");
        drop(metrics.begin_call());

        assert_eq!(metrics.success_count(), 2);
        assert_eq!(metrics.error_count(), 1);
        assert_eq!(metrics.aborted_count(), 1);
        assert_eq!(metrics.pending_count(), 0);
        assert_eq!(metrics.success_duration(), Duration::from_millis(10));
        assert_eq!(metrics.error_duration(), Duration::from_millis(1));
        assert_eq!(metrics.avg_success_latency(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_pending_tracks_open_guards() {
        let metrics = RunMetrics::new(10);
        let first = metrics.begin_call();
        let second = metrics.begin_call();
        assert_eq!(metrics.pending_count(), 2);

        first.success(Duration::ZERO);
        assert_eq!(metrics.pending_count(), 1);
        drop(second);
        assert_eq!(metrics.pending_count(), 0);
    }

    #[test]
    fn test_retained_errors_keep_newest() {
        let metrics = RunMetrics::new(2);
        for i in 0..5 {
            metrics.begin_call().error(Duration::ZERO, format!("error {i}"));
        }
        assert_eq!(metrics.error_count(), 5);
        assert_eq!(metrics.retained_errors(), vec!["error 3", "error 4"]);
    }

    #[test]
    fn test_rates_before_start_are_zero() {
        let metrics = RunMetrics::new(1);
        metrics.begin_call().success(Duration::ZERO);
        assert_eq!(metrics.elapsed(), Duration::ZERO);
        assert_eq!(metrics.calls_per_second(), 0.0);
        assert!(metrics.started_at().is_none());
    }

    #[test]
    fn test_elapsed_freezes_at_completion() {
        let metrics = RunMetrics::new(1);
        metrics.mark_started();
        std::thread::sleep(Duration::from_millis(5));
        metrics.mark_completed();
        let frozen = metrics.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(metrics.elapsed(), frozen);
        assert!(metrics.completed_at().is_some());
    }

    #[test]
    fn test_deviation_pct() {
        assert_eq!(deviation_pct(50.0, 100.0), -50.0);
        assert_eq!(deviation_pct(150.0, 100.0), 50.0);
        assert_eq!(deviation_pct(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = RunMetrics::new(1);
        metrics.mark_started();
        metrics.begin_call().success(Duration::from_millis(2));
        let json = serde_json::to_value(metrics.snapshot(10.0)).unwrap();
        assert_eq!(json["success"], 1);
        assert_eq!(json["target_qps"], 10.0);
    }
}
