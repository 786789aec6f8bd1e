//! Inbound frame classification.
//!
//! This crate provides [`Dispatcher`], the [`shard_transport::LineHandler`]
//! every shard listener feeds. For each line it, in order:
//!
//! 1. parses the frame, dropping anything malformed
//! 2. queues rate-limited requests for resending and tells the channel's admins
//! 3. resolves correlated responses through the callback registry
//! 4. runs the safety number workflow for identity changes
//! 5. reconciles disappearing-message timers
//! 6. hands messages with content to the command executor and messenger

mod dispatcher;
mod error;
mod outcome;

#[cfg(test)]
mod tests;

pub use dispatcher::{Dispatcher, DispatcherParts};
pub use error::{DispatchError, DispatchResult};
pub use outcome::{DispatchOutcome, DropReason, ExpiryAction, Processed};
