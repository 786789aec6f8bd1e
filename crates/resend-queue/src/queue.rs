//! Timers for rate-limited frames.
//!
//! A frame is identified by its shard and the SHA-256 of its serialized form,
//! so the daemon echoing the same request again finds the same entry. An
//! entry keeps its attempt count after its timer fires; it is forgotten once
//! it has been idle for twice the maximum interval.

use crate::backoff::compute_backoff;
use crate::error::ResendResult;
use parking_lot::Mutex;
use relay_config_and_utils::ResendConfig;
use relay_ports::metrics::names;
use relay_ports::{MaintainerNotice, MaintainerNotifier, MetricsSink};
use relay_protocol_types::{Frame, ShardId};
use sha2::{Digest, Sha256};
use shard_transport::FrameWriter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What [`ResendQueue::enqueue`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A timer was started; `attempt` is the number the resend will carry.
    Scheduled { attempt: u32, delay: Duration },
    /// A timer for this frame is already running.
    AlreadyScheduled,
    /// The attempt bound was reached and the frame was dropped.
    Abandoned { attempts: u32 },
}

impl EnqueueOutcome {
    pub fn retry_in(&self) -> Option<Duration> {
        match self {
            EnqueueOutcome::Scheduled { delay, .. } => Some(*delay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ResendKey {
    shard: ShardId,
    digest: [u8; 32],
}

impl ResendKey {
    fn new(frame: &Frame, shard: ShardId) -> ResendResult<Self> {
        let json = frame.to_json()?;
        Ok(Self {
            shard,
            digest: Sha256::digest(json.as_bytes()).into(),
        })
    }
}

struct ResendEntry {
    attempts: u32,
    timer: Option<JoinHandle<()>>,
    last_activity: Instant,
}

impl ResendEntry {
    fn is_scheduled(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}

struct Inner {
    writer: Arc<dyn FrameWriter>,
    notifier: Arc<dyn MaintainerNotifier>,
    metrics: Arc<dyn MetricsSink>,
    config: ResendConfig,
    entry_ttl: Duration,
    entries: Mutex<HashMap<ResendKey, ResendEntry>>,
}

/// Resends rate-limited frames with exponential backoff.
#[derive(Clone)]
pub struct ResendQueue {
    inner: Arc<Inner>,
}

impl ResendQueue {
    pub fn new(
        writer: Arc<dyn FrameWriter>,
        notifier: Arc<dyn MaintainerNotifier>,
        metrics: Arc<dyn MetricsSink>,
        config: ResendConfig,
    ) -> Self {
        let entry_ttl = config.max_interval().saturating_mul(2);
        Self {
            inner: Arc::new(Inner {
                writer,
                notifier,
                metrics,
                config,
                entry_ttl,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Schedule `frame` to be written to `shard` again.
    ///
    /// Reuses a running timer for the same frame. Once the frame has been
    /// resent `max_attempts` times it is abandoned and the channel's admins
    /// are told.
    pub async fn enqueue(&self, frame: Frame, shard: ShardId) -> ResendResult<EnqueueOutcome> {
        let key = ResendKey::new(&frame, shard)?;
        let channel = frame.username().map(str::to_string);

        let outcome = {
            let mut entries = self.inner.entries.lock();
            let ttl = self.inner.entry_ttl;
            entries.retain(|_, e| e.is_scheduled() || e.last_activity.elapsed() < ttl);

            let entry = entries.entry(key).or_insert_with(|| ResendEntry {
                attempts: 0,
                timer: None,
                last_activity: Instant::now(),
            });
            entry.last_activity = Instant::now();

            if entry.is_scheduled() {
                EnqueueOutcome::AlreadyScheduled
            } else if entry.attempts >= self.inner.config.max_attempts {
                let attempts = entry.attempts;
                entries.remove(&key);
                EnqueueOutcome::Abandoned { attempts }
            } else {
                let attempt = entry.attempts + 1;
                let delay = compute_backoff(entry.attempts, &self.inner.config);
                entry.timer = Some(tokio::spawn(fire(
                    self.inner.clone(),
                    key,
                    frame,
                    delay,
                )));
                EnqueueOutcome::Scheduled { attempt, delay }
            }
        };

        match outcome {
            EnqueueOutcome::Scheduled { attempt, delay } => {
                info!(
                    shard = %shard,
                    channel = channel.as_deref().unwrap_or("-"),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Resend scheduled"
                );
            }
            EnqueueOutcome::AlreadyScheduled => {
                debug!(shard = %shard, "Resend already scheduled");
            }
            EnqueueOutcome::Abandoned { attempts } => {
                warn!(
                    shard = %shard,
                    channel = channel.as_deref().unwrap_or("-"),
                    attempts,
                    "Abandoning rate-limited frame"
                );
                let shard_label = shard.to_string();
                self.inner
                    .metrics
                    .increment_counter(names::RESEND_ABANDONED, &[("shard", &shard_label)]);
                if let Some(channel) = &channel {
                    notify(
                        &self.inner,
                        channel,
                        MaintainerNotice::ResendAbandoned { attempts },
                    )
                    .await;
                }
            }
        }
        Ok(outcome)
    }

    /// Resends already made for `frame` on `shard`, if it is tracked.
    pub fn attempts(&self, frame: &Frame, shard: ShardId) -> Option<u32> {
        let key = ResendKey::new(frame, shard).ok()?;
        self.inner.entries.lock().get(&key).map(|e| e.attempts)
    }

    /// Frames with a running timer.
    pub fn scheduled_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|e| e.is_scheduled())
            .count()
    }

    /// Abort every timer and forget all entries.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.inner.entries.lock().drain().collect();
        for (_, entry) in drained {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }
}

async fn fire(inner: Arc<Inner>, key: ResendKey, frame: Frame, delay: Duration) {
    tokio::time::sleep(delay).await;

    // The timer is released before the write so an echo of this resend can
    // schedule the next attempt.
    let attempt = {
        let mut entries = inner.entries.lock();
        let Some(entry) = entries.get_mut(&key) else {
            return;
        };
        entry.attempts += 1;
        entry.timer = None;
        entry.last_activity = Instant::now();
        entry.attempts
    };

    if let Err(e) = inner.writer.write(&frame, key.shard).await {
        warn!(shard = %key.shard, attempt, error = %e, "Resend write failed");
    }

    let shard_label = key.shard.to_string();
    inner
        .metrics
        .increment_counter(names::RESEND_ATTEMPTED, &[("shard", &shard_label)]);
    info!(shard = %key.shard, attempt, "Rate-limited frame resent");

    if let Some(channel) = frame.username() {
        notify(
            &inner,
            channel,
            MaintainerNotice::ResendAttempted {
                attempt,
                delay_secs: delay.as_secs(),
            },
        )
        .await;
    }
}

async fn notify(inner: &Inner, channel: &str, notice: MaintainerNotice) {
    if let Err(e) = inner.notifier.notify_admins(channel, notice).await {
        warn!(channel = %channel, error = %e, "Failed to notify admins");
    }
}
