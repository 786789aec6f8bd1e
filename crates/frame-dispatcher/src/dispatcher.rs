use crate::error::DispatchResult;
use crate::outcome::{DispatchOutcome, DropReason, ExpiryAction, Processed};
use callback_registry::{CallbackRegistry, HandleOutcome, SignalApi};
use relay_ports::metrics::names;
use relay_ports::{
    Channel, ChannelRepository, CommandExecutor, Dispatchable, MaintainerNotice,
    MaintainerNotifier, MembershipStore, Messenger, MetricsSink, Role, Sender,
};
use relay_protocol_types::{
    Frame, IdentityFailure, MessageFrame, ShardId, UnexpectedErrorFrame, UntrustedIdentityFrame,
};
use resend_queue::{EnqueueOutcome, ResendQueue};
use safety_number_workflow::{FingerprintUpdate, SafetyNumberWorkflow};
use shard_transport::LineHandler;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the dispatcher drives.
pub struct DispatcherParts {
    pub api: SignalApi,
    pub resend: ResendQueue,
    pub safety_numbers: SafetyNumberWorkflow,
    pub channels: Arc<dyn ChannelRepository>,
    pub membership: Arc<dyn MembershipStore>,
    pub executor: Arc<dyn CommandExecutor>,
    pub messenger: Arc<dyn Messenger>,
    pub notifier: Arc<dyn MaintainerNotifier>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Classifies inbound frames. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherParts>,
}

impl Dispatcher {
    pub fn new(parts: DispatcherParts) -> Self {
        Self {
            inner: Arc::new(parts),
        }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        self.inner.api.registry()
    }

    pub fn resend_queue(&self) -> &ResendQueue {
        &self.inner.resend
    }

    /// Process one line received on `shard`.
    pub async fn dispatch(&self, shard: ShardId, line: &str) -> DispatchResult<DispatchOutcome> {
        let frame = match Frame::parse(line) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(shard = %shard, error = %e, "Dropping unparseable line");
                return Ok(self.dropped(shard, DropReason::Malformed));
            }
        };

        if let Frame::UnexpectedError(error) = &frame {
            return self.unexpected_error(shard, error).await;
        }

        let mut processed = Processed::default();

        match self.registry().handle(&frame) {
            HandleOutcome::Resolved(key) => {
                debug!(shard = %shard, key = %key, "Response correlated");
                return Ok(DispatchOutcome::Correlated(key));
            }
            HandleOutcome::IdentityFailures {
                key,
                failures,
                original,
            } => {
                debug!(shard = %shard, key = %key, count = failures.len(), "Send refused for changed identity");
                for update in send_failure_updates(shard, &failures, original.as_ref()) {
                    processed
                        .safety_number
                        .push(self.inner.safety_numbers.handle(update).await);
                }
            }
            HandleOutcome::Unmatched => {}
        }

        match &frame {
            Frame::UntrustedIdentity(untrusted) => {
                let update = untrusted_identity_update(shard, untrusted);
                processed
                    .safety_number
                    .push(self.inner.safety_numbers.handle(update).await);
            }
            Frame::Message(message) => {
                if frame.correlation_key().is_some() {
                    debug!(shard = %shard, "Dropping healthcheck echo nobody is waiting for");
                    return Ok(self.dropped(shard, DropReason::Uncorrelated));
                }
                return self.message(shard, &frame, message, processed).await;
            }
            _ => {}
        }

        if !processed.is_empty() {
            return Ok(DispatchOutcome::Processed(processed));
        }
        let reason = if frame.correlation_key().is_some() {
            DropReason::Uncorrelated
        } else {
            DropReason::Unhandled
        };
        debug!(shard = %shard, kind = frame.type_name(), reason = reason.as_str(), "Frame not handled");
        Ok(self.dropped(shard, reason))
    }

    async fn unexpected_error(
        &self,
        shard: ShardId,
        error: &UnexpectedErrorFrame,
    ) -> DispatchResult<DispatchOutcome> {
        if !relay_protocol_types::is_rate_limit_message(&error.data.message) {
            warn!(shard = %shard, message = %error.data.message, "Daemon reported an error");
            return Ok(self.dropped(shard, DropReason::DaemonError));
        }

        let shard_label = shard.to_string();
        self.inner
            .metrics
            .increment_counter(names::RATE_LIMITED, &[("shard", &shard_label)]);

        let Some(request) = error.data.request_frame() else {
            warn!(shard = %shard, "Rate limit error without a request to resend");
            return Ok(self.dropped(shard, DropReason::MissingRequest));
        };
        let channel = request.username().map(str::to_string);
        warn!(
            shard = %shard,
            channel = channel.as_deref().unwrap_or("-"),
            kind = request.type_name(),
            "Request rate limited"
        );

        let owner = self.owning_shard(channel.as_deref(), shard).await;
        if owner != shard {
            debug!(shard = %shard, owner = %owner, "Resending on the channel's own shard");
        }
        let outcome = self.inner.resend.enqueue(request, owner).await?;

        if let (EnqueueOutcome::Scheduled { delay, .. }, Some(channel)) = (&outcome, &channel) {
            let notice = MaintainerNotice::RateLimited {
                retry_in_secs: delay.as_secs(),
            };
            if let Err(e) = self.inner.notifier.notify_admins(channel, notice).await {
                warn!(channel = %channel, error = %e, "Failed to notify admins of rate limit");
            }
        }
        Ok(DispatchOutcome::RateLimited(outcome))
    }

    /// Shard serving `channel`, or `fallback` when it cannot be looked up.
    async fn owning_shard(&self, channel: Option<&str>, fallback: ShardId) -> ShardId {
        let Some(channel) = channel else {
            return fallback;
        };
        match self.inner.channels.find_channel(channel).await {
            Ok(Some(record)) => record.shard,
            Ok(None) => fallback,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Channel lookup failed; resending on arrival shard");
                fallback
            }
        }
    }

    async fn message(
        &self,
        shard: ShardId,
        frame: &Frame,
        message: &MessageFrame,
        mut processed: Processed,
    ) -> DispatchResult<DispatchOutcome> {
        let data = &message.data;
        let Some(channel) = self.inner.channels.find_channel(&data.username).await? else {
            debug!(shard = %shard, channel = %data.username, "Message for unknown channel");
            return Ok(self.dropped(shard, DropReason::UnknownChannel));
        };
        let sender = self
            .inner
            .membership
            .resolve_sender(&channel.phone_number, &data.source.number)
            .await?;

        if let Some(expiry_secs) = data.expires_in_seconds() {
            if expiry_secs != channel.message_expiry_time {
                let action = match self
                    .reconcile_expiry(shard, &channel, &sender, expiry_secs)
                    .await
                {
                    Ok(action) => action,
                    Err(e) => {
                        warn!(
                            shard = %shard,
                            channel = %channel.phone_number,
                            member = %sender.phone_number,
                            expiry_secs,
                            error = %e,
                            "Failed to reconcile disappearing-message timer"
                        );
                        ExpiryAction::Failed { expiry_secs }
                    }
                };
                processed.expiry = Some(action);
            }
        }

        if data.has_content() {
            self.inner
                .metrics
                .increment_counter(names::RELAYABLE_MESSAGES, &[("role", sender.role.as_str())]);

            let dispatchable = Dispatchable {
                channel,
                sender,
                frame: frame.clone(),
            };
            let result = self.inner.executor.execute(&dispatchable).await?;
            self.inner.messenger.dispatch(result.clone(), &dispatchable).await?;
            self.inner.metrics.increment_counter(
                names::MESSAGES_DISPATCHED,
                &[("status", result.status.as_str())],
            );
            processed.relayed = Some(result);
        }

        if processed.is_empty() {
            return Ok(self.dropped(shard, DropReason::Empty));
        }
        Ok(DispatchOutcome::Processed(processed))
    }

    async fn reconcile_expiry(
        &self,
        shard: ShardId,
        channel: &Channel,
        sender: &Sender,
        expiry_secs: u64,
    ) -> DispatchResult<ExpiryAction> {
        match sender.role {
            Role::None => Ok(ExpiryAction::Ignored),
            Role::Subscriber => {
                self.inner
                    .api
                    .set_expiration(
                        shard,
                        &channel.phone_number,
                        &sender.phone_number,
                        channel.message_expiry_time,
                    )
                    .await?;
                debug!(
                    channel = %channel.phone_number,
                    member = %sender.phone_number,
                    expiry_secs = channel.message_expiry_time,
                    "Reverted subscriber's disappearing-message timer"
                );
                Ok(ExpiryAction::Reverted {
                    member: sender.phone_number.clone(),
                    expiry_secs: channel.message_expiry_time,
                })
            }
            Role::Admin => {
                self.inner
                    .channels
                    .update_expiry(&channel.phone_number, expiry_secs)
                    .await?;

                let members = self.inner.membership.list_members(&channel.phone_number).await?;
                let mut recipients = 0;
                for member in members
                    .iter()
                    .filter(|m| m.member_phone_number != sender.phone_number)
                {
                    match self
                        .inner
                        .api
                        .set_expiration(
                            shard,
                            &channel.phone_number,
                            &member.member_phone_number,
                            expiry_secs,
                        )
                        .await
                    {
                        Ok(()) => recipients += 1,
                        Err(e) => warn!(
                            channel = %channel.phone_number,
                            member = %member.member_phone_number,
                            error = %e,
                            "Failed to propagate disappearing-message timer"
                        ),
                    }
                }
                info!(
                    channel = %channel.phone_number,
                    expiry_secs,
                    recipients,
                    "Admin changed disappearing-message timer"
                );
                Ok(ExpiryAction::Propagated {
                    expiry_secs,
                    recipients,
                })
            }
        }
    }

    fn dropped(&self, shard: ShardId, reason: DropReason) -> DispatchOutcome {
        let shard_label = shard.to_string();
        self.inner.metrics.increment_counter(
            names::FRAMES_DROPPED,
            &[("shard", &shard_label), ("reason", reason.as_str())],
        );
        DispatchOutcome::Dropped(reason)
    }
}

impl LineHandler for Dispatcher {
    /// Dispatch on a task of its own so the listener keeps reading.
    fn handle_line(&self, shard: ShardId, line: String) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.dispatch(shard, &line).await {
                Ok(outcome) => debug!(shard = %shard, outcome = ?outcome, "Frame dispatched"),
                Err(e) => warn!(shard = %shard, error = %e, "Frame dispatch failed"),
            }
        });
    }
}

fn untrusted_identity_update(shard: ShardId, frame: &UntrustedIdentityFrame) -> FingerprintUpdate {
    FingerprintUpdate {
        channel_phone_number: frame.data.username.clone(),
        member_phone_number: frame.data.number.clone(),
        fingerprint: frame.data.fingerprint.clone(),
        shard,
        pending_message: frame.data.pending_message(),
    }
}

/// One update per refused recipient. The stored send is carried by the
/// update for the recipient it was addressed to.
fn send_failure_updates(
    shard: ShardId,
    failures: &[IdentityFailure],
    original: Option<&Frame>,
) -> Vec<FingerprintUpdate> {
    let Some(Frame::Send(send)) = original else {
        debug!(shard = %shard, "Identity failure without a stored send");
        return Vec::new();
    };

    failures
        .iter()
        .map(|failure| FingerprintUpdate {
            channel_phone_number: send.username.clone(),
            member_phone_number: failure.address.number.clone(),
            fingerprint: failure.fingerprint.clone(),
            shard,
            pending_message: (failure.address.number == send.recipient_address.number)
                .then(|| Frame::Send(send.clone())),
        })
        .collect()
}
