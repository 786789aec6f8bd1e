//! Transport error types.

use relay_protocol_types::{ProtocolError, ShardId};
use thiserror::Error;

/// Transport error type.
#[derive(Error, Debug)]
pub enum TransportError {
    /// IO error (socket connect, read or write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be serialized
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The shard's socket never appeared
    #[error("Shard {shard} socket not available after {attempts} attempts")]
    ConnectionTimeout { shard: ShardId, attempts: u32 },

    /// No pool exists for the shard
    #[error("Shard {0} is not connected")]
    NotConnected(ShardId),

    /// The shard already has a live pool
    #[error("Shard {0} is already connected")]
    AlreadyConnected(ShardId),

    /// The shard's pool was closed while waiting for a connection
    #[error("Shard {0} was stopped")]
    ShardStopped(ShardId),

    /// No line handler was ever installed for the shard
    #[error("Shard {0} has no line handler to restart with")]
    NoHandler(ShardId),
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
