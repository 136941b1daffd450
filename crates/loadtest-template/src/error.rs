//! Error types for template compilation.

use thiserror::Error;

/// Errors raised while compiling a query template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `%` was followed by something other than a supported placeholder.
    #[error("Invalid placeholder at byte {offset}: {found:?}")]
    InvalidPlaceholder { offset: usize, found: String },

    /// Positions are 1-based.
    #[error("Placeholder at byte {offset} references position 0")]
    ZeroPosition { offset: usize },

    /// The template ended in the middle of a placeholder.
    #[error("Template ends inside a placeholder starting at byte {offset}")]
    Unterminated { offset: usize },
}
