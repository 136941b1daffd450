//! Error types for id sampling.

use thiserror::Error;

/// Errors that can occur while sampling id chains.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    /// Nothing has been loaded yet.
    #[error("No identifiers available: load id paths before sampling")]
    NoIds,

    /// A sampling strategy name could not be parsed.
    #[error("Unknown sampling strategy: {0}")]
    UnknownStrategy(String),
}
