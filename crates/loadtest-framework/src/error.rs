//! Error types for the load testing framework.

use crate::status::WorkloadStatus;
use thiserror::Error;

/// Errors raised by the scheduler and its configuration.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lifecycle method was called in a state that does not allow it.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkloadStatus,
        to: WorkloadStatus,
    },

    /// The run has not been started.
    #[error("Scheduler is not running (status: {0})")]
    NotReady(WorkloadStatus),

    /// The workload's pre-run validation failed.
    #[error("Pre-process failed: {0}")]
    PreProcess(String),

    /// The workload's post-run hook failed.
    #[error("Post-process failed: {0}")]
    PostProcess(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or summary (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for SchedulerError {
    fn from(err: serde_yaml::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// Outcome of a failed unit of work.
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// The call was interrupted; it counts as neither success nor error.
    #[error("call interrupted")]
    Interrupted,

    /// The call failed and counts as one error.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}
