//! Collaborator traits.
//!
//! The relay core owns no persistence and no business rules. Everything it
//! needs from the outside world comes through these seams, injected as
//! `Arc<dyn Trait>` at startup.

use crate::error::PortResult;
use crate::types::{
    Channel, CommandResult, Deauthorization, Dispatchable, MaintainerNotice, Member, Sender,
};
use async_trait::async_trait;

/// Lookup and update of channel records.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Find a channel by the phone number it owns.
    async fn find_channel(&self, phone_number: &str) -> PortResult<Option<Channel>>;

    /// All channels, used to subscribe them at startup.
    async fn list_channels(&self) -> PortResult<Vec<Channel>>;

    /// Persist a new canonical disappearing-message timer.
    async fn update_expiry(&self, phone_number: &str, expiry_secs: u64) -> PortResult<()>;
}

/// Channel memberships and deauthorization records.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Role and language of `member` in `channel`; `Role::None` if absent.
    async fn resolve_sender(&self, channel: &str, member: &str) -> PortResult<Sender>;

    async fn list_admins(&self, channel: &str) -> PortResult<Vec<Member>>;

    async fn list_members(&self, channel: &str) -> PortResult<Vec<Member>>;

    async fn remove_membership(&self, channel: &str, member: &str) -> PortResult<()>;

    /// Whether a deauthorization for this exact fingerprint is already recorded.
    async fn has_deauthorization(
        &self,
        channel: &str,
        member: &str,
        fingerprint: &str,
    ) -> PortResult<bool>;

    async fn record_deauthorization(&self, record: Deauthorization) -> PortResult<()>;
}

/// Interprets an inbound message (commands, or plain relay).
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, dispatchable: &Dispatchable) -> PortResult<CommandResult>;
}

/// Fans a command result out to the right recipients.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn dispatch(&self, result: CommandResult, dispatchable: &Dispatchable)
        -> PortResult<()>;
}

/// Sends in-channel notices to a channel's admins.
#[async_trait]
pub trait MaintainerNotifier: Send + Sync {
    async fn notify_admins(&self, channel: &str, notice: MaintainerNotice) -> PortResult<()>;
}
