//! Pool backpressure tests.

use super::harness::{test_config, FakeDaemon, RecordingHandler};
use crate::Transport;
use relay_protocol_types::{Frame, ShardId};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// With one connection, a second writer waits for the first lease.
#[tokio::test]
async fn second_write_blocks_until_lease_is_released() {
    let dir = tempdir().unwrap();
    let daemon = FakeDaemon::start(dir.path(), ShardId(0));
    let transport = Arc::new(Transport::new(test_config(dir.path(), 1)));
    transport
        .connect(ShardId(0), RecordingHandler::new())
        .await
        .unwrap();

    let mut lease = transport.acquire(ShardId(0)).await.unwrap();
    assert_eq!(transport.available_connections(ShardId(0)), Some(0));

    let blocked = {
        let transport = transport.clone();
        tokio::spawn(async move {
            transport
                .write(&Frame::subscribe("+1666"), ShardId(0))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished(), "write must wait for the leased connection");
    assert!(daemon.received().is_empty());

    lease
        .write_line(&Frame::subscribe("+1555").to_json().unwrap())
        .await
        .unwrap();
    drop(lease);

    tokio::time::timeout(Duration::from_secs(2), blocked)
        .await
        .expect("blocked write should complete after release")
        .unwrap()
        .unwrap();

    let lines = daemon.wait_for_lines(2).await;
    assert!(lines[0].contains("+1555"));
    assert!(lines[1].contains("+1666"));
}

/// A failed write still returns its connection to the pool.
#[tokio::test]
async fn lease_is_returned_after_write_failure() {
    let dir = tempdir().unwrap();
    let daemon = FakeDaemon::start(dir.path(), ShardId(0));
    let transport = Transport::new(test_config(dir.path(), 1));
    transport
        .connect(ShardId(0), RecordingHandler::new())
        .await
        .unwrap();
    daemon.wait_for_connections(1).await;
    daemon.drop_connections().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut failed = false;
    for _ in 0..20 {
        if transport
            .write(&Frame::version_request(), ShardId(0))
            .await
            .is_err()
        {
            failed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(failed, "writes to a closed daemon connection must fail");
    assert_eq!(transport.available_connections(ShardId(0)), Some(1));
}
