//! Error types for topology queries.

use thiserror::Error;

/// Errors raised by topology operations with invalid arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A traversal depth must be at least one hop.
    #[error("Invalid depth {0}: depth must be at least 1")]
    InvalidDepth(usize),
}
