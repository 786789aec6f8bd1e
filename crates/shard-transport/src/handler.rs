//! Inbound line handling and shard lifecycle events.

use relay_protocol_types::ShardId;

/// Consumer of raw inbound protocol lines.
///
/// Called from a connection's read-listener for every non-empty line. The
/// call is synchronous: implementations must hand the line off (e.g. spawn a
/// task) rather than do slow work inline, or the listener stalls.
pub trait LineHandler: Send + Sync {
    fn handle_line(&self, shard: ShardId, line: String);
}

/// Lifecycle events reported by shard listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardEvent {
    /// The daemon closed one of the shard's connections, or reading failed.
    ConnectionClosed {
        shard: ShardId,
        /// Pool generation the connection belonged to.
        generation: u64,
        connection: usize,
    },
}
