//! Run lifecycle states and abort reasons.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a scheduler run.
///
/// ```text
/// Initialized -> CanRun -> PendingRun -> Running -> WaitingCompletion -> Completed | Aborted
///      any non-final state -> PendingShutdown -> Shutdown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadStatus {
    Initialized,
    CanRun,
    PendingRun,
    Running,
    WaitingCompletion,
    Completed,
    Aborted,
    PendingShutdown,
    Shutdown,
}

impl WorkloadStatus {
    /// Whether the run can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkloadStatus::Completed | WorkloadStatus::Aborted | WorkloadStatus::Shutdown
        )
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Transitions only move forward; no state can be re-entered.
    pub fn can_transition_to(self, next: WorkloadStatus) -> bool {
        use WorkloadStatus::*;
        match (self, next) {
            (Initialized, CanRun)
            | (CanRun, PendingRun)
            | (PendingRun, Running)
            | (Running, WaitingCompletion)
            | (WaitingCompletion, Completed)
            | (WaitingCompletion, Aborted)
            | (PendingShutdown, Shutdown) => true,
            (Completed | Aborted, PendingShutdown) => false,
            (PendingShutdown | Shutdown, PendingShutdown) => false,
            (_, PendingShutdown) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadStatus::Initialized => "INITIALIZED",
            WorkloadStatus::CanRun => "CAN_RUN",
            WorkloadStatus::PendingRun => "PENDING_RUN",
            WorkloadStatus::Running => "RUNNING",
            WorkloadStatus::WaitingCompletion => "WAITING_COMPLETION",
            WorkloadStatus::Completed => "COMPLETED",
            WorkloadStatus::Aborted => "ABORTED",
            WorkloadStatus::PendingShutdown => "PENDING_SHUTDOWN",
            WorkloadStatus::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Cumulative errors went past the configured threshold.
    ErrorThreshold { errors: u64, threshold: u64 },
    /// Achieved rate stayed too far from the ramp target.
    QpsDeviation {
        deviation_pct: f64,
        threshold_pct: f64,
        checks: u32,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ErrorThreshold { errors, threshold } => {
                write!(f, "error count {errors} exceeded threshold {threshold}")
            }
            AbortReason::QpsDeviation {
                deviation_pct,
                threshold_pct,
                checks,
            } => write!(
                f,
                "QPS deviation {deviation_pct:.1}% exceeded {threshold_pct:.1}% for {checks} consecutive checks"
            ),
        }
    }
}
