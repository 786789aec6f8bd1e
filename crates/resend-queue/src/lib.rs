//! Resending of frames the daemon rejected for rate limiting.
//!
//! This crate provides [`ResendQueue`]: one cancelable timer per
//! `(shard, frame)`, exponential backoff between attempts and abandonment
//! after a bounded number of them.

mod backoff;
mod error;
mod queue;

pub use backoff::compute_backoff;
pub use error::{ResendError, ResendResult};
pub use queue::{EnqueueOutcome, ResendQueue};
