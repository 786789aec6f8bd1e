//! What the dispatcher did with one frame.

use relay_ports::CommandResult;
use relay_protocol_types::CorrelationKey;
use resend_queue::EnqueueOutcome;
use safety_number_workflow::WorkflowResult;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Nothing was done with the frame.
    Dropped(DropReason),
    /// The frame answered an outstanding request and needed nothing else.
    Correlated(CorrelationKey),
    /// The frame reported a rate-limited request, which was queued.
    RateLimited(EnqueueOutcome),
    /// One or more of the side workflows ran.
    Processed(Processed),
}

impl DispatchOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, DispatchOutcome::Dropped(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The line was not a frame.
    Malformed,
    /// A message without body or attachments and no expiry change.
    Empty,
    /// A message for a phone number that is not a channel.
    UnknownChannel,
    /// A daemon error that is not a rate limit.
    DaemonError,
    /// A rate-limit error without an echoed request.
    MissingRequest,
    /// A correlatable response nobody is waiting for.
    Uncorrelated,
    /// A frame kind the relay has no use for.
    Unhandled,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::Empty => "empty",
            DropReason::UnknownChannel => "unknown_channel",
            DropReason::DaemonError => "daemon_error",
            DropReason::MissingRequest => "missing_request",
            DropReason::Uncorrelated => "uncorrelated",
            DropReason::Unhandled => "unhandled",
        }
    }
}

/// How a changed disappearing-message timer was reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryAction {
    /// The sender is not a member; their timer is not ours to manage.
    Ignored,
    /// A subscriber changed it; their session was set back.
    Reverted { member: String, expiry_secs: u64 },
    /// An admin changed it; the channel adopted it and every other member
    /// was updated.
    Propagated { expiry_secs: u64, recipients: usize },
    /// Reconciliation failed; the message itself is still handled.
    Failed { expiry_secs: u64 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Processed {
    pub safety_number: Vec<WorkflowResult>,
    pub expiry: Option<ExpiryAction>,
    pub relayed: Option<CommandResult>,
}

impl Processed {
    pub fn is_empty(&self) -> bool {
        self.safety_number.is_empty() && self.expiry.is_none() && self.relayed.is_none()
    }
}
