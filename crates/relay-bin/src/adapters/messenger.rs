//! Fan-out of executor results to channel members.

use async_trait::async_trait;
use callback_registry::SignalApi;
use relay_ports::{
    Channel, CommandResult, CommandStatus, Dispatchable, MembershipStore, Messenger, PortError,
    PortResult, Role, Sender,
};
use relay_protocol_types::{Attachment, Frame, IncomingMessage};
use std::sync::Arc;
use tracing::debug;

/// Relays plain messages and replies to commands, one write at a time.
///
/// - admin messages go to every other member, prefixed with the channel name
/// - subscriber messages go to the admins only
/// - command results are answered to the sender alone
pub struct BroadcastMessenger {
    api: SignalApi,
    membership: Arc<dyn MembershipStore>,
}

impl BroadcastMessenger {
    pub fn new(api: SignalApi, membership: Arc<dyn MembershipStore>) -> Self {
        Self { api, membership }
    }

    async fn relay(&self, channel: &Channel, sender: &Sender, message: &IncomingMessage) -> PortResult<()> {
        let (recipients, body) = match sender.role {
            Role::Admin => {
                let members = self.membership.list_members(&channel.phone_number).await?;
                let recipients = members
                    .into_iter()
                    .map(|m| m.member_phone_number)
                    .filter(|number| *number != sender.phone_number)
                    .collect::<Vec<_>>();
                (recipients, format!("[{}]\n{}", channel.name, message.body()))
            }
            Role::Subscriber => {
                let admins = self.membership.list_admins(&channel.phone_number).await?;
                let recipients = admins
                    .into_iter()
                    .map(|m| m.member_phone_number)
                    .collect::<Vec<_>>();
                (recipients, format!("[PRIVATE MESSAGE]\n{}", message.body()))
            }
            Role::None => return Ok(()),
        };

        if recipients.is_empty() {
            debug!(channel = %channel.phone_number, role = sender.role.as_str(), "No recipients to relay to");
            return Ok(());
        }

        let attachments: Vec<Attachment> =
            message.attachments().iter().map(Attachment::forwardable).collect();
        let report = self
            .api
            .broadcast(channel.shard, &channel.phone_number, &recipients, &body, &attachments)
            .await;

        if report.failed.is_empty() {
            Ok(())
        } else {
            Err(PortError::Delivery(format!(
                "{} of {} relayed sends failed",
                report.failed.len(),
                recipients.len()
            )))
        }
    }

    async fn reply(&self, channel: &Channel, sender: &Sender, text: &str) -> PortResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let frame = Frame::send(&channel.phone_number, &sender.phone_number, text, Vec::new());
        self.api
            .send_frame(channel.shard, &frame)
            .await
            .map(|_| ())
            .map_err(|e| PortError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl Messenger for BroadcastMessenger {
    async fn dispatch(&self, result: CommandResult, dispatchable: &Dispatchable) -> PortResult<()> {
        let Frame::Message(message) = &dispatchable.frame else {
            return Ok(());
        };
        match result.status {
            CommandStatus::Noop => {
                self.relay(&dispatchable.channel, &dispatchable.sender, &message.data)
                    .await
            }
            CommandStatus::Success | CommandStatus::Error => {
                self.reply(&dispatchable.channel, &dispatchable.sender, &result.message)
                    .await
            }
        }
    }
}
