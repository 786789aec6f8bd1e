//! Registry error types.

use relay_protocol_types::CorrelationKey;
use shard_transport::TransportError;
use thiserror::Error;

/// Registry error type.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No response arrived before the deadline
    #[error("Timed out waiting for {0}")]
    Timeout(CorrelationKey),

    /// The daemon answered with an error
    #[error("{key} rejected: {message}")]
    Rejected { key: CorrelationKey, message: String },

    /// A newer registration took over the key
    #[error("Registration for {0} was replaced")]
    Replaced(CorrelationKey),

    /// The entry was cancelled before resolving
    #[error("Registration for {0} was cancelled")]
    Cancelled(CorrelationKey),

    /// The request could not be written
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias using RegistryError.
pub type RegistryResult<T> = Result<T, RegistryError>;
