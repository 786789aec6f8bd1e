//! The outbound seam used by everything above the transport.

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_protocol_types::{Frame, ShardId};
use std::sync::atomic::{AtomicBool, Ordering};

/// Writes frames to a shard.
///
/// [`crate::Transport`] is the production implementation; the registry,
/// workflows and resend queue only depend on this trait.
#[async_trait]
pub trait FrameWriter: Send + Sync {
    async fn write(&self, frame: &Frame, shard: ShardId) -> TransportResult<()>;
}

/// Writer that records frames instead of sending them.
///
/// While failing, writes return [`TransportError::NotConnected`] and record
/// nothing.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    written: Mutex<Vec<(ShardId, Frame)>>,
    failing: AtomicBool,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<(ShardId, Frame)> {
        self.written.lock().clone()
    }

    /// Frames written, without their shard.
    pub fn frames(&self) -> Vec<Frame> {
        self.written.lock().iter().map(|(_, f)| f.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.written.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.written.lock().clear();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameWriter for RecordingWriter {
    async fn write(&self, frame: &Frame, shard: ShardId) -> TransportResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected(shard));
        }
        self.written.lock().push((shard, frame.clone()));
        Ok(())
    }
}
