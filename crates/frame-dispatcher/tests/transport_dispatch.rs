//! End-to-end: a fake daemon socket, the real transport and the dispatcher.

use callback_registry::{ApiTimeouts, CallbackRegistry, SignalApi};
use frame_dispatcher::{Dispatcher, DispatcherParts};
use relay_config_and_utils::{Paths, ResendConfig};
use relay_ports::{
    Channel, InMemoryChannelStore, RecordingExecutor, RecordingMessenger, RecordingMetrics,
    RecordingNotifier, Role,
};
use relay_protocol_types::{Frame, ShardId};
use resend_queue::ResendQueue;
use safety_number_workflow::SafetyNumberWorkflow;
use shard_transport::{Transport, TransportConfig, DEFAULT_MAX_LINE_BYTES};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::mpsc;

const CHANNEL: &str = "+15550001111";
const SUBSCRIBER: &str = "+15550000003";
const SHARD: ShardId = ShardId(2);

/// Accepts one connection; returns its writer and a stream of received lines.
async fn fake_daemon(socket_dir: &Path) -> (OwnedWriteHalf, mpsc::UnboundedReceiver<String>) {
    let path = Paths::shard_socket_file(socket_dir, SHARD.0);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let listener = UnixListener::bind(&path).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, write) = stream.into_split();
        accepted_tx.send(write).unwrap();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let writer = async { accepted_rx.recv().await.unwrap() };
    (writer.await, rx)
}

struct Relay {
    executor: Arc<RecordingExecutor>,
    notifier: Arc<RecordingNotifier>,
}

async fn start_relay(socket_dir: &Path) -> (Arc<Transport>, Relay) {
    let transport = Arc::new(Transport::new(TransportConfig {
        socket_dir: socket_dir.to_path_buf(),
        pool_size: 1,
        poll_interval: Duration::from_millis(10),
        max_attempts: 50,
        max_line_bytes: DEFAULT_MAX_LINE_BYTES,
    }));

    let store = Arc::new(InMemoryChannelStore::new());
    store.insert_channel(Channel {
        phone_number: CHANNEL.to_string(),
        name: "neighbors".to_string(),
        message_expiry_time: 0,
        shard: SHARD,
    });
    store.add_member(CHANNEL, SUBSCRIBER, Role::Subscriber);

    let metrics = Arc::new(RecordingMetrics::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let executor = Arc::new(RecordingExecutor::new());
    let api = SignalApi::new(
        transport.clone(),
        CallbackRegistry::new(metrics.clone()),
        ApiTimeouts::default(),
    );
    let resend = ResendQueue::new(
        transport.clone(),
        notifier.clone(),
        metrics.clone(),
        ResendConfig {
            min_interval_ms: 50,
            max_interval_ms: 400,
            max_attempts: 3,
        },
    );
    let safety_numbers =
        SafetyNumberWorkflow::new(api.clone(), store.clone(), notifier.clone(), metrics.clone());

    let dispatcher = Dispatcher::new(DispatcherParts {
        api,
        resend,
        safety_numbers,
        channels: store.clone(),
        membership: store,
        executor: executor.clone(),
        messenger: Arc::new(RecordingMessenger::new()),
        notifier: notifier.clone(),
        metrics,
    });

    transport
        .connect(SHARD, Arc::new(dispatcher))
        .await
        .unwrap();
    (transport, Relay { executor, notifier })
}

async fn next_line(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("daemon received nothing")
        .expect("daemon connection closed")
}

#[tokio::test]
async fn rate_limited_send_is_written_back_to_its_shard() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = tokio::spawn({
        let dir = dir.path().to_path_buf();
        async move { fake_daemon(&dir).await }
    });
    let (_transport, relay) = start_relay(dir.path()).await;
    let (mut daemon_writer, mut received) = daemon.await.unwrap();

    let send = Frame::send(CHANNEL, SUBSCRIBER, "hi", vec![]);
    let error = serde_json::json!({
        "type": "unexpected_error",
        "data": {
            "message": "Rate limit exceeded: 413",
            "request": serde_json::to_value(&send).unwrap(),
        }
    });
    daemon_writer
        .write_all(format!("{}\n", error).as_bytes())
        .await
        .unwrap();

    let resent = Frame::parse(&next_line(&mut received).await).unwrap();
    assert_eq!(resent, send);
    assert_eq!(relay.executor.call_count(), 0);
    assert!(!relay.notifier.is_empty());
}

#[tokio::test]
async fn inbound_message_reaches_the_executor() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = tokio::spawn({
        let dir = dir.path().to_path_buf();
        async move { fake_daemon(&dir).await }
    });
    let (_transport, relay) = start_relay(dir.path()).await;
    let (mut daemon_writer, _received) = daemon.await.unwrap();

    let message = serde_json::json!({
        "type": "message",
        "data": {
            "username": CHANNEL,
            "source": { "number": SUBSCRIBER },
            "dataMessage": { "body": "hello", "expiresInSeconds": 0 },
        }
    });
    // Garbage first: the listener must survive it.
    daemon_writer.write_all(b"\xff\xfe not a frame\n").await.unwrap();
    daemon_writer
        .write_all(format!("{}\n", message).as_bytes())
        .await
        .unwrap();

    for _ in 0..500 {
        if relay.executor.call_count() == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("message never reached the executor");
}
