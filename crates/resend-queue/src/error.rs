//! Resend queue error types.

use relay_protocol_types::ProtocolError;
use thiserror::Error;

/// Resend queue error type.
#[derive(Error, Debug)]
pub enum ResendError {
    /// The frame could not be serialized for keying
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias using ResendError.
pub type ResendResult<T> = Result<T, ResendError>;
