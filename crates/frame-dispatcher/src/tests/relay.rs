//! Message classification.

use super::harness::{
    attachment_line, fixture, fixture_with_executor, message_line, CHANNEL, CHANNEL_EXPIRY,
    SHARD, STRANGER, SUBSCRIBER,
};
use crate::{DispatchOutcome, DropReason};
use relay_ports::metrics::names;
use relay_ports::{CommandResult, CommandStatus, RecordingExecutor, Role};
use serde_json::json;

#[tokio::test]
async fn subscriber_message_goes_to_executor_then_messenger() {
    let f = fixture();
    let line = message_line(SUBSCRIBER, Some("hello all"), CHANNEL_EXPIRY);

    let outcome = f.dispatcher.dispatch(SHARD, &line).await.unwrap();
    let DispatchOutcome::Processed(processed) = outcome else {
        panic!("expected processed, got {:?}", outcome);
    };
    assert_eq!(processed.relayed, Some(CommandResult::noop()));
    assert!(processed.expiry.is_none());

    let calls = f.executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].channel.phone_number, CHANNEL);
    assert_eq!(calls[0].sender.phone_number, SUBSCRIBER);
    assert_eq!(calls[0].sender.role, Role::Subscriber);
    assert_eq!(calls[0].sender.language, "EN");

    let dispatched = f.messenger.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].1, calls[0]);

    assert_eq!(f.metrics.counter(names::RELAYABLE_MESSAGES), 1);
    assert_eq!(f.metrics.counter(names::MESSAGES_DISPATCHED), 1);
}

#[tokio::test]
async fn executor_result_is_passed_to_messenger() {
    let result = CommandResult {
        command: Some("HELP".to_string()),
        status: CommandStatus::Success,
        message: "commands: ...".to_string(),
    };
    let f = fixture_with_executor(RecordingExecutor::returning(result.clone()));
    let line = message_line(SUBSCRIBER, Some("HELP"), CHANNEL_EXPIRY);

    f.dispatcher.dispatch(SHARD, &line).await.unwrap();
    assert_eq!(f.messenger.dispatched()[0].0, result);
}

#[tokio::test]
async fn attachment_without_body_is_relayed() {
    let f = fixture();
    let outcome = f
        .dispatcher
        .dispatch(SHARD, &attachment_line(SUBSCRIBER))
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Processed(_)));
    assert_eq!(f.executor.call_count(), 1);
}

#[tokio::test]
async fn stranger_message_is_relayed_with_no_role() {
    let f = fixture();
    let line = message_line(STRANGER, Some("can I join?"), CHANNEL_EXPIRY);
    f.dispatcher.dispatch(SHARD, &line).await.unwrap();
    assert_eq!(f.executor.calls()[0].sender.role, Role::None);
}

/// Empty body, no attachments, unchanged timer: nothing happens.
#[tokio::test]
async fn empty_message_is_dropped() {
    let f = fixture();
    for body in [None, Some(""), Some("   ")] {
        let line = message_line(SUBSCRIBER, body, CHANNEL_EXPIRY);
        let outcome = f.dispatcher.dispatch(SHARD, &line).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::Empty));
    }
    assert_eq!(f.executor.call_count(), 0);
    assert!(f.messenger.is_empty());
    assert!(f.writer.is_empty());
    assert_eq!(f.metrics.counter(names::FRAMES_DROPPED), 3);
}

#[tokio::test]
async fn receipt_without_data_message_is_dropped() {
    let f = fixture();
    let line = json!({
        "type": "message",
        "data": { "username": CHANNEL, "source": { "number": SUBSCRIBER } }
    })
    .to_string();
    let outcome = f.dispatcher.dispatch(SHARD, &line).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::Empty));
    assert!(f.writer.is_empty());
}

#[tokio::test]
async fn malformed_lines_are_dropped() {
    let f = fixture();
    for line in [
        "not json",
        "{",
        r#"{"type":"no_such_kind"}"#,
        r#"{"type":"message","data":{}}"#,
        "",
    ] {
        let outcome = f.dispatcher.dispatch(SHARD, line).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::Malformed), "{}", line);
    }
    assert_eq!(f.executor.call_count(), 0);
}

#[tokio::test]
async fn message_for_unknown_channel_is_dropped() {
    let f = fixture();
    let line = message_line(SUBSCRIBER, Some("hi"), CHANNEL_EXPIRY).replace(CHANNEL, "+19999999999");
    let outcome = f.dispatcher.dispatch(SHARD, &line).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::UnknownChannel));
    assert_eq!(f.executor.call_count(), 0);
}

#[tokio::test]
async fn frames_with_no_use_are_dropped() {
    let f = fixture();
    let line = json!({ "type": "verification_succeeded", "data": { "username": CHANNEL } }).to_string();
    let outcome = f.dispatcher.dispatch(SHARD, &line).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::Uncorrelated));

    let request = json!({ "type": "subscribe", "username": CHANNEL }).to_string();
    let outcome = f.dispatcher.dispatch(SHARD, &request).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::Unhandled));
}
