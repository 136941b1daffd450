//! Configuration types for load runs.

use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Target call rate for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QpsTarget {
    /// Constant rate for the whole run.
    Fixed { qps: f64 },
    /// Start at `start`, add `increment` every `step`, and hold at `end`.
    Ramp {
        start: f64,
        increment: f64,
        end: f64,
        step: Duration,
    },
}

impl QpsTarget {
    /// Target calls per second `elapsed` into the run.
    pub fn qps_at(&self, elapsed: Duration) -> f64 {
        match *self {
            QpsTarget::Fixed { qps } => qps,
            QpsTarget::Ramp {
                start,
                increment,
                end,
                step,
            } => {
                let steps = (elapsed.as_secs_f64() / step.as_secs_f64()).floor();
                let qps = start + increment * steps;
                if increment >= 0.0 {
                    qps.min(end)
                } else {
                    qps.max(end)
                }
            }
        }
    }

    pub fn is_ramp(&self) -> bool {
        matches!(self, QpsTarget::Ramp { .. })
    }

    fn validate(&self) -> Result<(), SchedulerError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SchedulerError::Config(format!(
                    "{name} must be a positive number, got {value}"
                )))
            }
        };
        match *self {
            QpsTarget::Fixed { qps } => positive("qps", qps),
            QpsTarget::Ramp {
                start,
                increment,
                end,
                step,
            } => {
                positive("ramp start qps", start)?;
                positive("ramp end qps", end)?;
                if !increment.is_finite() || increment == 0.0 {
                    return Err(SchedulerError::Config(
                        "ramp increment must be a non-zero number".to_string(),
                    ));
                }
                if (end - start) * increment < 0.0 {
                    return Err(SchedulerError::Config(format!(
                        "ramp increment {increment} never reaches {end} from {start}"
                    )));
                }
                if step.is_zero() {
                    return Err(SchedulerError::Config(
                        "ramp step must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for QpsTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QpsTarget::Fixed { qps } => write!(f, "{qps} qps"),
            QpsTarget::Ramp {
                start,
                increment,
                end,
                step,
            } => write!(f, "{start} -> {end} qps (+{increment} every {step:?})"),
        }
    }
}

/// Which session of a run a scheduler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Measurement,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Warmup => f.write_str("warmup"),
            Phase::Measurement => f.write_str("measurement"),
        }
    }
}

/// Configuration for a load run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Target call rate.
    pub target: QpsTarget,
    /// Length of the measurement session.
    pub duration: Duration,
    /// Length of the warmup session (none = no warmup).
    pub warmup: Option<Duration>,
    /// Number of pacing tasks sharing the target rate.
    pub scheduler_tasks: usize,
    /// Maximum number of calls in flight.
    pub worker_tasks: usize,
    /// The run aborts once the error count exceeds this value.
    pub error_abort_threshold: u64,
    /// Ramp runs abort when achieved rate deviates from target by more than this percentage.
    pub qps_deviation_abort_pct: Option<f64>,
    /// Consecutive deviating checks required before a deviation abort.
    pub deviation_checks: u32,
    /// How often abort conditions and expiry are checked.
    pub check_interval: Duration,
    /// How often a progress snapshot is sent to the metrics sink.
    pub progress_interval: Duration,
    /// How long in-flight calls may run after dispatch stops before being cancelled.
    pub shutdown_timeout: Duration,
    /// Number of most recent error messages kept for the summary.
    pub max_retained_errors: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            target: QpsTarget::Fixed { qps: 100.0 },
            duration: Duration::from_secs(60),
            warmup: None,
            scheduler_tasks: 1,
            worker_tasks: 16,
            error_abort_threshold: 1000,
            qps_deviation_abort_pct: None,
            deviation_checks: 3,
            check_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
            max_retained_errors: 50,
        }
    }
}

impl WorkloadConfig {
    /// Create a configuration with a fixed rate and duration.
    pub fn new(qps: f64, duration: Duration) -> Self {
        Self {
            target: QpsTarget::Fixed { qps },
            duration,
            ..Default::default()
        }
    }

    /// Load a configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SchedulerError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_target(mut self, target: QpsTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = Some(warmup);
        self
    }

    pub fn with_scheduler_tasks(mut self, count: usize) -> Self {
        self.scheduler_tasks = count;
        self
    }

    pub fn with_worker_tasks(mut self, count: usize) -> Self {
        self.worker_tasks = count;
        self
    }

    pub fn with_error_abort_threshold(mut self, threshold: u64) -> Self {
        self.error_abort_threshold = threshold;
        self
    }

    pub fn with_qps_deviation_abort_pct(mut self, pct: f64) -> Self {
        self.qps_deviation_abort_pct = Some(pct);
        self
    }

    pub fn with_deviation_checks(mut self, checks: u32) -> Self {
        self.deviation_checks = checks;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_retained_errors(mut self, count: usize) -> Self {
        self.max_retained_errors = count;
        self
    }

    /// How long the given session runs.
    pub fn run_duration(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Warmup => self.warmup.unwrap_or_default(),
            Phase::Measurement => self.duration,
        }
    }

    /// Reject configurations a run cannot execute.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.target.validate()?;
        if self.duration.is_zero() {
            return Err(SchedulerError::Config(
                "duration must be greater than zero".to_string(),
            ));
        }
        if self.scheduler_tasks == 0 {
            return Err(SchedulerError::Config(
                "scheduler_tasks must be at least 1".to_string(),
            ));
        }
        if self.worker_tasks == 0 {
            return Err(SchedulerError::Config(
                "worker_tasks must be at least 1".to_string(),
            ));
        }
        if self.check_interval.is_zero() || self.progress_interval.is_zero() {
            return Err(SchedulerError::Config(
                "check and progress intervals must be greater than zero".to_string(),
            ));
        }
        if let Some(pct) = self.qps_deviation_abort_pct {
            if !pct.is_finite() || pct <= 0.0 {
                return Err(SchedulerError::Config(format!(
                    "qps_deviation_abort_pct must be positive, got {pct}"
                )));
            }
        }
        if self.deviation_checks == 0 {
            return Err(SchedulerError::Config(
                "deviation_checks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
