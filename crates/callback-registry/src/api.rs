//! Request facade over a [`FrameWriter`] and the [`CallbackRegistry`].
//!
//! Requests that expect an answer are registered before they are written, so
//! a response racing the write still finds its entry. When the write fails
//! the entry is cancelled and the transport error is returned.

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{CallbackRegistry, Correlated, PendingResponse, Resolution};
use relay_config_and_utils::Config;
use relay_protocol_types::{
    healthcheck_body, new_request_id, Attachment, CallbackKind, CorrelationKey, Frame, ShardId,
};
use shard_transport::{FrameWriter, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long each kind of request may wait for its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub callback: Duration,
    pub verify: Duration,
    pub healthcheck: Duration,
}

impl ApiTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            callback: config.callback_timeout(),
            verify: config.verify_timeout(),
            healthcheck: config.healthcheck_timeout(),
        }
    }
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of a sequential broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Recipients whose send was written.
    pub written: usize,
    /// Recipients whose send could not be written.
    pub failed: Vec<(String, TransportError)>,
}

/// Typed requests to the daemon.
#[derive(Clone)]
pub struct SignalApi {
    writer: Arc<dyn FrameWriter>,
    registry: CallbackRegistry,
    timeouts: ApiTimeouts,
}

impl SignalApi {
    pub fn new(writer: Arc<dyn FrameWriter>, registry: CallbackRegistry, timeouts: ApiTimeouts) -> Self {
        Self {
            writer,
            registry,
            timeouts,
        }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn timeouts(&self) -> ApiTimeouts {
        self.timeouts
    }

    pub async fn register(&self, shard: ShardId, username: &str) -> RegistryResult<()> {
        self.write(&Frame::register(username), shard).await
    }

    /// Submit a verification code and wait for the daemon's verdict.
    pub async fn verify(&self, shard: ShardId, username: &str, code: &str) -> RegistryResult<()> {
        let key = CorrelationKey::new(CallbackKind::Verify, username);
        let pending = self.registry.expect(key, None, self.timeouts.verify);
        self.write_expected(&Frame::verify(username, code), shard, pending)
            .await
            .map(|_| ())
    }

    pub async fn subscribe(&self, shard: ShardId, username: &str) -> RegistryResult<()> {
        self.write(&Frame::subscribe(username), shard).await
    }

    pub async fn unsubscribe(&self, shard: ShardId, username: &str) -> RegistryResult<()> {
        self.write(&Frame::unsubscribe(username), shard).await
    }

    /// Write a send with a fresh id and return the handle its results
    /// resolve. The frame is kept with the entry so an identity failure can
    /// hand it back for resending.
    pub async fn send(
        &self,
        shard: ShardId,
        username: &str,
        recipient: &str,
        body: &str,
        attachments: Vec<Attachment>,
    ) -> RegistryResult<PendingResponse> {
        let id = new_request_id();
        let frame = Frame::send(username, recipient, body, attachments).with_id(id.clone());
        let key = CorrelationKey::new(CallbackKind::Send, id);
        let pending = self
            .registry
            .expect(key.clone(), Some(frame.clone()), self.timeouts.callback);

        if let Err(e) = self.writer.write(&frame, shard).await {
            self.registry.cancel(&key);
            return Err(e.into());
        }
        Ok(pending)
    }

    pub async fn send_and_wait(
        &self,
        shard: ShardId,
        username: &str,
        recipient: &str,
        body: &str,
        attachments: Vec<Attachment>,
    ) -> RegistryResult<Correlated> {
        self.send(shard, username, recipient, body, attachments)
            .await?
            .wait()
            .await
    }

    /// Write an already built send-like frame under a fresh id, tracked
    /// without a waiter. Returns the id used.
    pub async fn send_frame(&self, shard: ShardId, frame: &Frame) -> RegistryResult<String> {
        let id = new_request_id();
        let frame = frame.clone().with_id(id.clone());
        let key = CorrelationKey::new(CallbackKind::Send, id.clone());
        self.registry.register(
            key.clone(),
            Resolution::FireAndForget,
            Some(frame.clone()),
            self.timeouts.callback,
        );

        if let Err(e) = self.writer.write(&frame, shard).await {
            self.registry.cancel(&key);
            return Err(e.into());
        }
        Ok(id)
    }

    /// Send `body` to every recipient, one write at a time. A failed write is
    /// recorded and the broadcast continues.
    pub async fn broadcast(
        &self,
        shard: ShardId,
        username: &str,
        recipients: &[String],
        body: &str,
        attachments: &[Attachment],
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for recipient in recipients {
            let frame = Frame::send(username, recipient.as_str(), body, attachments.to_vec());
            match self.send_frame(shard, &frame).await {
                Ok(_) => report.written += 1,
                Err(RegistryError::Transport(e)) => {
                    warn!(shard = %shard, channel = %username, error = %e, "Broadcast send failed");
                    report.failed.push((recipient.clone(), e));
                }
                Err(e) => {
                    warn!(shard = %shard, channel = %username, error = %e, "Broadcast send failed");
                }
            }
        }
        debug!(
            shard = %shard,
            channel = %username,
            written = report.written,
            failed = report.failed.len(),
            "Broadcast complete"
        );
        report
    }

    pub async fn set_expiration(
        &self,
        shard: ShardId,
        username: &str,
        recipient: &str,
        expires_in_seconds: u64,
    ) -> RegistryResult<()> {
        let frame = Frame::set_expiration(username, recipient, expires_in_seconds);
        self.write(&frame, shard).await
    }

    /// Trust `fingerprint` for `recipient` and wait for the confirmation.
    pub async fn trust(
        &self,
        shard: ShardId,
        username: &str,
        recipient: &str,
        fingerprint: &str,
    ) -> RegistryResult<()> {
        let key = CorrelationKey::new(CallbackKind::Trust, fingerprint);
        let pending = self.registry.expect(key, None, self.timeouts.callback);
        self.write_expected(&Frame::trust(username, recipient, fingerprint), shard, pending)
            .await
            .map(|_| ())
    }

    /// Ask the daemon for its version string.
    pub async fn version(&self, shard: ShardId) -> RegistryResult<String> {
        let id = new_request_id();
        let key = CorrelationKey::new(CallbackKind::Version, id.clone());
        let pending = self.registry.expect(key, None, self.timeouts.callback);
        match self
            .write_expected(&Frame::version_request().with_id(id), shard, pending)
            .await?
        {
            Correlated::Version(version) => Ok(version),
            _ => Ok(String::new()),
        }
    }

    /// Round-trip a `healthcheck <id>` message from `channel` to the
    /// diagnostics account `relay_number` and return the elapsed time.
    pub async fn healthcheck(
        &self,
        shard: ShardId,
        channel: &str,
        relay_number: &str,
    ) -> RegistryResult<Duration> {
        let id = new_request_id();
        let key = CorrelationKey::new(CallbackKind::Healthcheck, id.clone());
        let pending = self.registry.expect(key, None, self.timeouts.healthcheck);
        let frame = Frame::send(channel, relay_number, healthcheck_body(&id), Vec::new());

        match self.write_expected(&frame, shard, pending).await? {
            Correlated::Healthcheck { elapsed } => {
                info!(shard = %shard, channel = %channel, elapsed_ms = elapsed.as_millis() as u64, "Healthcheck answered");
                Ok(elapsed)
            }
            _ => Ok(Duration::ZERO),
        }
    }

    async fn write(&self, frame: &Frame, shard: ShardId) -> RegistryResult<()> {
        self.writer.write(frame, shard).await?;
        Ok(())
    }

    async fn write_expected(
        &self,
        frame: &Frame,
        shard: ShardId,
        pending: PendingResponse,
    ) -> RegistryResult<Correlated> {
        if let Err(e) = self.writer.write(frame, shard).await {
            self.registry.cancel(pending.key());
            return Err(e.into());
        }
        pending.wait().await
    }
}
