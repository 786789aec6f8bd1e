//! Workflow error types.
//!
//! These never leave the crate: [`crate::SafetyNumberWorkflow::handle`]
//! converts them into a [`crate::WorkflowResult`].

use callback_registry::RegistryError;
use relay_ports::PortError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The trust request failed or timed out
    #[error("Trust request failed: {0}")]
    Trust(#[source] RegistryError),

    /// The pending message could not be resent
    #[error("Resend failed: {0}")]
    Resend(#[source] RegistryError),

    /// A membership or notification collaborator failed
    #[error("Collaborator error: {0}")]
    Port(#[from] PortError),
}

/// Result type alias using WorkflowError.
pub type SafetyNumberResult<T> = Result<T, WorkflowError>;
