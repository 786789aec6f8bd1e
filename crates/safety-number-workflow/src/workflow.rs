use crate::error::{SafetyNumberResult, WorkflowError};
use callback_registry::SignalApi;
use relay_ports::metrics::names;
use relay_ports::{
    CommandStatus, Deauthorization, MaintainerNotice, MaintainerNotifier, MembershipStore,
    MetricsSink, Role,
};
use relay_protocol_types::{Frame, ShardId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A member of a channel presented a new safety number.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintUpdate {
    pub channel_phone_number: String,
    pub member_phone_number: String,
    pub fingerprint: String,
    /// Shard serving the channel.
    pub shard: ShardId,
    /// Send refused because of the change, to be written again once trusted.
    pub pending_message: Option<Frame>,
}

/// Outcome reported by every branch of the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowResult {
    pub status: CommandStatus,
    pub message: String,
}

impl WorkflowResult {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: message.into(),
        }
    }

    fn noop(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Noop,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

pub struct SafetyNumberWorkflow {
    api: SignalApi,
    membership: Arc<dyn MembershipStore>,
    notifier: Arc<dyn MaintainerNotifier>,
    metrics: Arc<dyn MetricsSink>,
}

impl SafetyNumberWorkflow {
    pub fn new(
        api: SignalApi,
        membership: Arc<dyn MembershipStore>,
        notifier: Arc<dyn MaintainerNotifier>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            api,
            membership,
            notifier,
            metrics,
        }
    }

    /// Trust or deauthorize depending on the member's role. Never fails:
    /// errors come back as a result with [`CommandStatus::Error`].
    pub async fn handle(&self, update: FingerprintUpdate) -> WorkflowResult {
        match self.run(&update).await {
            Ok((outcome, result)) => {
                self.metrics
                    .increment_counter(names::SAFETY_NUMBER_CHANGES, &[("outcome", outcome)]);
                result
            }
            Err(e) => {
                warn!(
                    channel = %update.channel_phone_number,
                    member = %update.member_phone_number,
                    error = %e,
                    "Safety number workflow failed"
                );
                self.metrics
                    .increment_counter(names::SAFETY_NUMBER_CHANGES, &[("outcome", "error")]);
                WorkflowResult::error(e.to_string())
            }
        }
    }

    async fn run(
        &self,
        update: &FingerprintUpdate,
    ) -> SafetyNumberResult<(&'static str, WorkflowResult)> {
        let sender = self
            .membership
            .resolve_sender(&update.channel_phone_number, &update.member_phone_number)
            .await?;

        match sender.role {
            Role::Admin => self.deauthorize(update).await,
            Role::Subscriber | Role::None => self.trust(update).await,
        }
    }

    async fn trust(
        &self,
        update: &FingerprintUpdate,
    ) -> SafetyNumberResult<(&'static str, WorkflowResult)> {
        self.api
            .trust(
                update.shard,
                &update.channel_phone_number,
                &update.member_phone_number,
                &update.fingerprint,
            )
            .await
            .map_err(WorkflowError::Trust)?;

        info!(
            channel = %update.channel_phone_number,
            member = %update.member_phone_number,
            "Trusted new safety number"
        );

        let Some(pending) = &update.pending_message else {
            return Ok((
                "trusted",
                WorkflowResult::success(format!(
                    "Trusted new safety number for {}",
                    update.member_phone_number
                )),
            ));
        };

        self.api
            .send_frame(update.shard, pending)
            .await
            .map_err(WorkflowError::Resend)?;
        debug!(channel = %update.channel_phone_number, member = %update.member_phone_number, "Pending message resent");

        Ok((
            "trusted",
            WorkflowResult::success(format!(
                "Trusted new safety number for {} and resent the pending message",
                update.member_phone_number
            )),
        ))
    }

    async fn deauthorize(
        &self,
        update: &FingerprintUpdate,
    ) -> SafetyNumberResult<(&'static str, WorkflowResult)> {
        let channel = &update.channel_phone_number;
        let member = &update.member_phone_number;

        if self
            .membership
            .has_deauthorization(channel, member, &update.fingerprint)
            .await?
        {
            debug!(channel = %channel, member = %member, "Admin already deauthorized for this fingerprint");
            return Ok((
                "already_deauthorized",
                WorkflowResult::noop(format!("{} was already deauthorized", member)),
            ));
        }

        self.membership.remove_membership(channel, member).await?;
        self.membership
            .record_deauthorization(Deauthorization {
                channel_phone_number: channel.clone(),
                member_phone_number: member.clone(),
                fingerprint: update.fingerprint.clone(),
            })
            .await?;
        warn!(channel = %channel, member = %member, "Admin deauthorized after safety number change");

        self.notifier
            .notify_admins(
                channel,
                MaintainerNotice::AdminDeauthorized {
                    member_phone_number: member.clone(),
                },
            )
            .await?;

        Ok((
            "deauthorized",
            WorkflowResult::success(format!("Deauthorized admin {}", member)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callback_registry::{ApiTimeouts, CallbackRegistry};
    use relay_ports::{InMemoryChannelStore, RecordingMetrics, RecordingNotifier};
    use shard_transport::RecordingWriter;
    use std::time::Duration;

    const CHANNEL: &str = "+1555";

    struct Fixture {
        workflow: Arc<SafetyNumberWorkflow>,
        api: SignalApi,
        writer: Arc<RecordingWriter>,
        store: Arc<InMemoryChannelStore>,
        notifier: Arc<RecordingNotifier>,
        metrics: Arc<RecordingMetrics>,
    }

    fn fixture() -> Fixture {
        let writer = Arc::new(RecordingWriter::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let api = SignalApi::new(
            writer.clone(),
            CallbackRegistry::new(metrics.clone()),
            ApiTimeouts {
                callback: Duration::from_secs(30),
                verify: Duration::from_secs(30),
                healthcheck: Duration::from_secs(15),
            },
        );
        let store = Arc::new(InMemoryChannelStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let workflow = Arc::new(SafetyNumberWorkflow::new(
            api.clone(),
            store.clone(),
            notifier.clone(),
            metrics.clone(),
        ));
        Fixture {
            workflow,
            api,
            writer,
            store,
            notifier,
            metrics,
        }
    }

    fn update(member: &str, pending: Option<Frame>) -> FingerprintUpdate {
        FingerprintUpdate {
            channel_phone_number: CHANNEL.to_string(),
            member_phone_number: member.to_string(),
            fingerprint: "05 ff".to_string(),
            shard: ShardId(1),
            pending_message: pending,
        }
    }

    fn trusted(member: &str) -> Frame {
        Frame::parse(&format!(
            r#"{{"type":"trusted_fingerprint","data":{{"request":{{"fingerprint":"05 ff","username":"{}","recipientAddress":{{"number":"{}"}}}}}}}}"#,
            CHANNEL, member
        ))
        .unwrap()
    }

    async fn wait_for_writes(writer: &RecordingWriter, count: usize) {
        for _ in 0..100 {
            if writer.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {} writes, got {:?}", count, writer.frames());
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_is_trusted_and_pending_message_resent_once() {
        let f = fixture();
        f.store.add_member(CHANNEL, "+1777", Role::Subscriber);
        let pending = Frame::send(CHANNEL, "+1777", "hello", vec![]).with_id("old");

        let task = {
            let workflow = f.workflow.clone();
            let update = update("+1777", Some(pending));
            tokio::spawn(async move { workflow.handle(update).await })
        };
        wait_for_writes(&f.writer, 1).await;
        assert_eq!(
            f.writer.written()[0],
            (ShardId(1), Frame::trust(CHANNEL, "+1777", "05 ff"))
        );

        f.api.registry().handle(&trusted("+1777"));
        let result = task.await.unwrap();
        assert!(result.is_success(), "{:?}", result);

        let frames = f.writer.frames();
        assert_eq!(frames.len(), 2, "trust plus exactly one resend");
        match &frames[1] {
            Frame::Send(send) => {
                assert_eq!(send.message_body, "hello");
                assert_ne!(send.id.as_deref(), Some("old"));
            }
            other => panic!("expected a send, got {:?}", other),
        }
        assert!(f.notifier.is_empty());
        assert_eq!(f.metrics.counter(names::SAFETY_NUMBER_CHANGES), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_sender_is_trusted_without_resend() {
        let f = fixture();
        let task = {
            let workflow = f.workflow.clone();
            tokio::spawn(async move { workflow.handle(update("+1888", None)).await })
        };
        wait_for_writes(&f.writer, 1).await;
        f.api.registry().handle(&trusted("+1888"));

        assert!(task.await.unwrap().is_success());
        assert_eq!(f.writer.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trust_timeout_becomes_error_result_without_resend() {
        let f = fixture();
        f.store.add_member(CHANNEL, "+1777", Role::Subscriber);
        let pending = Frame::send(CHANNEL, "+1777", "hello", vec![]);

        let result = f.workflow.handle(update("+1777", Some(pending))).await;
        assert_eq!(result.status, CommandStatus::Error);
        assert!(result.message.contains("Trust request failed"));
        assert_eq!(f.writer.len(), 1, "only the trust request");
    }

    #[tokio::test]
    async fn trust_write_failure_becomes_error_result() {
        let f = fixture();
        f.writer.set_failing(true);
        let result = f.workflow.handle(update("+1777", None)).await;
        assert_eq!(result.status, CommandStatus::Error);
    }

    #[tokio::test]
    async fn admin_is_deauthorized_without_trust() {
        let f = fixture();
        f.store.add_member(CHANNEL, "+1100", Role::Admin);
        f.store.add_member(CHANNEL, "+1200", Role::Admin);
        f.store.add_member(CHANNEL, "+1777", Role::Subscriber);

        let result = f.workflow.handle(update("+1100", None)).await;
        assert!(result.is_success(), "{:?}", result);

        assert!(f.writer.is_empty(), "admins are never trusted automatically");
        assert!(f.store.member(CHANNEL, "+1100").is_none());
        assert_eq!(
            f.store.deauthorizations(),
            vec![Deauthorization {
                channel_phone_number: CHANNEL.to_string(),
                member_phone_number: "+1100".to_string(),
                fingerprint: "05 ff".to_string(),
            }]
        );
        assert_eq!(
            f.notifier.notices(),
            vec![(
                CHANNEL.to_string(),
                MaintainerNotice::AdminDeauthorized {
                    member_phone_number: "+1100".to_string()
                }
            )]
        );
    }

    #[tokio::test]
    async fn duplicate_admin_notification_is_not_reprocessed() {
        let f = fixture();
        f.store.add_member(CHANNEL, "+1100", Role::Admin);
        f.workflow.handle(update("+1100", None)).await;

        // The same member re-added as admin, then the same change reported again.
        f.store.add_member(CHANNEL, "+1100", Role::Admin);
        let result = f.workflow.handle(update("+1100", None)).await;

        assert_eq!(result.status, CommandStatus::Noop);
        assert_eq!(f.notifier.len(), 1);
        assert_eq!(f.store.deauthorizations().len(), 1);
        assert!(f.store.member(CHANNEL, "+1100").is_some());
    }
}
