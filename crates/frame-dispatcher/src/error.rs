//! Dispatcher error types.

use callback_registry::RegistryError;
use relay_ports::PortError;
use relay_protocol_types::ProtocolError;
use resend_queue::ResendError;
use thiserror::Error;

/// Dispatcher error type.
///
/// Errors end at [`crate::Dispatcher`]'s line handler, where they are logged.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A collaborator failed
    #[error("Collaborator error: {0}")]
    Port(#[from] PortError),

    /// A request to the daemon failed
    #[error("Request error: {0}")]
    Registry(#[from] RegistryError),

    /// A rate-limited frame could not be queued
    #[error("Resend error: {0}")]
    Resend(#[from] ResendError),

    /// A frame could not be interpreted
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias using DispatchError.
pub type DispatchResult<T> = Result<T, DispatchError>;
