//! Shard supervision: restart a shard whose daemon dropped a connection.

use crate::app::RelayState;
use relay_protocol_types::ShardId;
use shard_transport::ShardEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const BACKOFF_CAP_EXPONENT: u32 = 5;

/// Spawn the shard supervisor.
///
/// Only the shard that reported the close is restarted; closes reported by
/// an already replaced pool generation are ignored.
pub fn spawn_shard_supervisor(
    state: RelayState,
    mut events: mpsc::UnboundedReceiver<ShardEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shard supervisor received shutdown signal");
                    break;
                }
                event = events.recv() => {
                    let Some(ShardEvent::ConnectionClosed { shard, generation, connection }) = event else {
                        debug!("Shard event channel closed");
                        break;
                    };
                    if state
                        .transport
                        .generation(shard)
                        .is_some_and(|current| current != generation)
                    {
                        debug!(shard = %shard, generation, "Ignoring close from a replaced pool");
                        continue;
                    }

                    warn!(shard = %shard, generation, connection, "Shard connection closed; restarting shard");
                    if !recover_shard(&state, shard, &mut shutdown).await {
                        info!("Shard supervisor received shutdown signal during recovery");
                        break;
                    }
                }
            }
        }

        debug!("Shard supervisor task stopped");
    })
}

/// Restart `shard` until it is back, then resubscribe its channels.
/// Returns false if shutdown arrived first.
async fn recover_shard(
    state: &RelayState,
    shard: ShardId,
    shutdown: &mut oneshot::Receiver<()>,
) -> bool {
    let mut backoff = SupervisorBackoff::default();
    loop {
        let result = tokio::select! {
            _ = &mut *shutdown => return false,
            result = state.transport.restart(shard) => result,
        };

        match result {
            Ok(()) => {
                if backoff.failures > 0 {
                    info!(
                        shard = %shard,
                        previous_failures = backoff.failures,
                        "Shard recovered after restart failures"
                    );
                }
                let subscribed = state.subscribe_shard(shard).await;
                info!(shard = %shard, subscribed, "Shard restarted");
                return true;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    shard = %shard,
                    error = %e,
                    failure_count = backoff.failures,
                    next_attempt_ms = delay.as_millis() as u64,
                    "Shard restart failed; backing off"
                );
                tokio::select! {
                    _ = &mut *shutdown => return false,
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct SupervisorBackoff {
    failures: u32,
}

impl SupervisorBackoff {
    fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let shift = self.failures.min(BACKOFF_CAP_EXPONENT);
        let delay = BACKOFF_BASE.saturating_mul(1u32 << shift);
        delay.min(BACKOFF_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config_and_utils::{Config, Paths};
    use relay_ports::{Channel, InMemoryChannelStore};
    use std::path::Path;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::{UnixListener, UnixStream};

    const CHANNEL: &str = "+15550001111";

    #[test]
    fn backoff_doubles_then_caps() {
        let mut backoff = SupervisorBackoff::default();
        let delays: Vec<_> = (0..7).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
                Duration::from_secs(30),
                Duration::from_secs(30),
                Duration::from_secs(30),
            ]
        );
        assert_eq!(backoff.failures, 7);
    }

    fn relay_state(socket_dir: &Path) -> (RelayState, mpsc::UnboundedReceiver<ShardEvent>) {
        let config = Config {
            shard_count: 1,
            pool_size: 1,
            socket_dir: socket_dir.to_path_buf(),
            connect_poll_interval_ms: 10,
            connect_max_attempts: 100,
            ..Config::default()
        };
        let store = Arc::new(InMemoryChannelStore::new());
        store.insert_channel(Channel {
            phone_number: CHANNEL.to_string(),
            name: "neighbors".to_string(),
            message_expiry_time: 0,
            shard: ShardId(0),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        (RelayState::build(config, store, tx), rx)
    }

    async fn accept(listener: &UnixListener) -> UnixStream {
        tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("relay never connected")
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn closed_shard_is_restarted_and_resubscribed() {
        let dir = tempfile::tempdir().unwrap();
        let path = Paths::shard_socket_file(dir.path(), 0);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let listener = UnixListener::bind(&path).unwrap();

        let (state, events) = relay_state(dir.path());
        let (connected, first) = tokio::join!(state.connect_all(), accept(&listener));
        connected.unwrap();
        let first_generation = state.transport.generation(ShardId(0)).unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = spawn_shard_supervisor(state.clone(), events, shutdown_rx);

        // The daemon drops the connection.
        drop(first);
        let second = accept(&listener).await;

        let mut lines = BufReader::new(second).lines();
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("no resubscription")
            .unwrap()
            .unwrap();
        let frame: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(frame["type"], "subscribe");
        assert_eq!(frame["username"], CHANNEL);
        assert_ne!(state.transport.generation(ShardId(0)), Some(first_generation));

        shutdown_tx.send(()).unwrap();
        supervisor.await.unwrap();
        state.shutdown();
    }

    #[tokio::test]
    async fn stale_generation_close_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = Paths::shard_socket_file(dir.path(), 0);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let listener = UnixListener::bind(&path).unwrap();

        let (state, _events) = relay_state(dir.path());
        let (connected, _conn) = tokio::join!(state.connect_all(), accept(&listener));
        connected.unwrap();
        let generation = state.transport.generation(ShardId(0)).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = spawn_shard_supervisor(state.clone(), rx, shutdown_rx);
        tx.send(ShardEvent::ConnectionClosed {
            shard: ShardId(0),
            generation: generation.wrapping_sub(1),
            connection: 0,
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.transport.generation(ShardId(0)), Some(generation));

        shutdown_tx.send(()).unwrap();
        supervisor.await.unwrap();
        state.shutdown();
    }
}
