//! Request/response correlation for the daemon protocol.
//!
//! This crate provides:
//! - [`CallbackRegistry`]: outstanding requests keyed by kind and id, each
//!   resolved exactly once by its response or its timeout
//! - [`SignalApi`]: typed requests written through a
//!   [`shard_transport::FrameWriter`] and awaited through the registry

mod api;
mod error;
mod registry;

pub use api::{ApiTimeouts, BroadcastReport, SignalApi};
pub use error::{RegistryError, RegistryResult};
pub use registry::{CallbackRegistry, Correlated, HandleOutcome, PendingResponse, Resolution};
