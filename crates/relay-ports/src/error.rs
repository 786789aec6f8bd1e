//! Collaborator error types.

use thiserror::Error;

/// Error raised by an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Channel or membership not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store read or write failed
    #[error("Store error: {0}")]
    Store(String),

    /// Outbound delivery failed
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Command interpretation failed
    #[error("Command error: {0}")]
    Command(String),
}

/// Result type alias using PortError.
pub type PortResult<T> = Result<T, PortError>;
