//! Reaction to a channel member's safety number changing.
//!
//! Subscribers and strangers are trusted automatically and the message their
//! change blocked is resent once. Admins are never trusted automatically:
//! they lose their admin membership and the remaining admins are told.

mod error;
mod workflow;

pub use error::{SafetyNumberResult, WorkflowError};
pub use workflow::{FingerprintUpdate, SafetyNumberWorkflow, WorkflowResult};
