//! Transport to the protocol daemons.
//!
//! This crate provides:
//! - [`Transport`]: per-shard fixed-size pools of Unix socket connections
//! - [`ConnectionLease`]: exclusive, drop-released use of one connection
//! - [`LineHandler`]: the seam inbound lines are delivered through
//! - [`FrameWriter`]: the outbound seam used by the layers above
//! - [`ShardTiering`]: shard assignment for new channels

mod error;
mod handler;
mod pool;
mod tiering;
mod transport;
mod writer;

#[cfg(test)]
mod tests;

pub use error::{TransportError, TransportResult};
pub use handler::{LineHandler, ShardEvent};
pub use pool::{ConnectionLease, ShardPool};
pub use tiering::ShardTiering;
pub use transport::{wait_for_socket, Transport, TransportConfig, DEFAULT_MAX_LINE_BYTES};
pub use writer::{FrameWriter, RecordingWriter};
