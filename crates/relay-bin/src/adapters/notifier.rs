//! In-channel notices to a channel's admins, with rate-limit throttling.

use async_trait::async_trait;
use callback_registry::SignalApi;
use parking_lot::Mutex;
use relay_ports::{
    ChannelRepository, MaintainerNotice, MaintainerNotifier, MembershipStore, PortError,
    PortResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Broadcasts notices to a channel's admins on the channel's shard.
///
/// Rate-limit notices to the same channel are sent at most once per
/// `cooldown`; other notices always go out.
pub struct ThrottledNotifier {
    api: SignalApi,
    channels: Arc<dyn ChannelRepository>,
    membership: Arc<dyn MembershipStore>,
    cooldown: Duration,
    last_rate_limit_notice: Mutex<HashMap<String, Instant>>,
}

impl ThrottledNotifier {
    pub fn new(
        api: SignalApi,
        channels: Arc<dyn ChannelRepository>,
        membership: Arc<dyn MembershipStore>,
        cooldown: Duration,
    ) -> Self {
        Self {
            api,
            channels,
            membership,
            cooldown,
            last_rate_limit_notice: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the channel's rate-limit notice slot if the cooldown has passed.
    fn claim_rate_limit_slot(&self, channel: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last_rate_limit_notice.lock();
        match last.get(channel) {
            Some(sent_at) if now.duration_since(*sent_at) < self.cooldown => false,
            _ => {
                last.insert(channel.to_string(), now);
                true
            }
        }
    }
}

#[async_trait]
impl MaintainerNotifier for ThrottledNotifier {
    async fn notify_admins(&self, channel: &str, notice: MaintainerNotice) -> PortResult<()> {
        if notice.is_rate_limit_notice() && !self.claim_rate_limit_slot(channel) {
            debug!(channel = %channel, "Rate-limit notice suppressed during cooldown");
            return Ok(());
        }

        let record = self
            .channels
            .find_channel(channel)
            .await?
            .ok_or_else(|| PortError::NotFound(channel.to_string()))?;
        let admins: Vec<String> = self
            .membership
            .list_admins(channel)
            .await?
            .into_iter()
            .map(|m| m.member_phone_number)
            .collect();
        if admins.is_empty() {
            debug!(channel = %channel, "No admins to notify");
            return Ok(());
        }

        let report = self
            .api
            .broadcast(record.shard, channel, &admins, &notice.text(), &[])
            .await;
        if report.failed.is_empty() {
            Ok(())
        } else {
            Err(PortError::Delivery(format!(
                "notice reached {} of {} admins",
                report.written,
                admins.len()
            )))
        }
    }
}
