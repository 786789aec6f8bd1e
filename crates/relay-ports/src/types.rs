//! Domain types shared between the relay core and its collaborators.

use relay_protocol_types::{Frame, ShardId};
use serde::{Deserialize, Serialize};

/// Default language for members that never chose one.
pub const DEFAULT_LANGUAGE: &str = "EN";

/// Role of a phone number within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Subscriber,
    /// Not a member of the channel.
    None,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Subscriber => "subscriber",
            Role::None => "none",
        }
    }
}

/// A relay channel, addressed by the phone number it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub phone_number: String,
    pub name: String,
    /// Canonical disappearing-message timer in seconds (0 disables).
    pub message_expiry_time: u64,
    /// Daemon instance serving this channel; fixed at creation.
    pub shard: ShardId,
}

/// Membership of a phone number in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub channel_phone_number: String,
    pub member_phone_number: String,
    pub role: Role,
    pub language: String,
}

/// Resolved author of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub phone_number: String,
    pub role: Role,
    pub language: String,
}

impl Sender {
    /// A sender with no membership in the channel.
    pub fn unknown(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            role: Role::None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Record of an admin removed after an unexplained safety number change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deauthorization {
    pub channel_phone_number: String,
    pub member_phone_number: String,
    pub fingerprint: String,
}

/// Unit of work handed to the command executor and messenger.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatchable {
    pub channel: Channel,
    pub sender: Sender,
    pub frame: Frame,
}

/// Outcome status of interpreting a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// A command ran and succeeded.
    Success,
    /// A command ran and failed; the sender should be told.
    Error,
    /// Not a command; relay the message as-is.
    Noop,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Success => "success",
            CommandStatus::Error => "error",
            CommandStatus::Noop => "noop",
        }
    }
}

/// Result of the command executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Recognized command name, if the message was one.
    pub command: Option<String>,
    pub status: CommandStatus,
    /// Reply for the sender, empty when nothing should be said.
    pub message: String,
}

impl CommandResult {
    /// Result for a plain message that is relayed rather than interpreted.
    pub fn noop() -> Self {
        Self {
            command: None,
            status: CommandStatus::Noop,
            message: String::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.status == CommandStatus::Noop
    }
}

/// In-channel notice for a channel's admins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintainerNotice {
    /// A send was rate limited and will be retried.
    RateLimited { retry_in_secs: u64 },
    /// A rate-limited send was written again.
    ResendAttempted { attempt: u32, delay_secs: u64 },
    /// A rate-limited send was dropped after repeated attempts.
    ResendAbandoned { attempts: u32 },
    /// An admin lost admin rights because their safety number changed.
    AdminDeauthorized { member_phone_number: String },
}

impl MaintainerNotice {
    /// Notices about rate limiting, which may be throttled.
    pub fn is_rate_limit_notice(&self) -> bool {
        matches!(
            self,
            MaintainerNotice::RateLimited { .. } | MaintainerNotice::ResendAttempted { .. }
        )
    }

    pub fn text(&self) -> String {
        match self {
            MaintainerNotice::RateLimited { retry_in_secs } => format!(
                "Messages from this channel are being rate limited. Retrying in about {} seconds.",
                retry_in_secs
            ),
            MaintainerNotice::ResendAttempted {
                attempt,
                delay_secs,
            } => format!(
                "Resent a rate-limited message (attempt {}) after waiting {} seconds.",
                attempt, delay_secs
            ),
            MaintainerNotice::ResendAbandoned { attempts } => format!(
                "Gave up resending a rate-limited message after {} attempts.",
                attempts
            ),
            MaintainerNotice::AdminDeauthorized {
                member_phone_number,
            } => format!(
                "The safety number of admin {} changed. They were removed as an admin and must be re-added to regain access.",
                member_phone_number
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"subscriber\"").unwrap(),
            Role::Subscriber
        );
        assert_eq!(Role::None.as_str(), "none");
    }

    #[test]
    fn test_unknown_sender() {
        let sender = Sender::unknown("+1999");
        assert_eq!(sender.role, Role::None);
        assert_eq!(sender.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_notice_classification() {
        assert!(MaintainerNotice::RateLimited { retry_in_secs: 2 }.is_rate_limit_notice());
        assert!(!MaintainerNotice::ResendAbandoned { attempts: 5 }.is_rate_limit_notice());
        let text = MaintainerNotice::AdminDeauthorized {
            member_phone_number: "+1777".into(),
        }
        .text();
        assert!(text.contains("+1777"));
    }
}
