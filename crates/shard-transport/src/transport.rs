//! Shard-pooled transport to the protocol daemons.
//!
//! Shard `n` is one daemon instance listening at `<socket_dir>/<n>/signald.sock`.
//! Each connected shard owns a [`ShardPool`] of `pool_size` connections, and
//! every connection has its own read-listener feeding the shard's
//! [`LineHandler`].

use crate::error::{TransportError, TransportResult};
use crate::handler::{LineHandler, ShardEvent};
use crate::pool::{ConnectionLease, ShardPool};
use crate::writer::FrameWriter;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use relay_config_and_utils::{Config, Paths};
use relay_protocol_types::{Frame, ShardId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest inbound line accepted from a daemon, newline excluded.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub socket_dir: PathBuf,
    pub pool_size: usize,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Inbound lines longer than this are discarded.
    pub max_line_bytes: usize,
}

impl TransportConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            socket_dir: config.socket_dir.clone(),
            pool_size: config.pool_size,
            poll_interval: config.connect_poll_interval(),
            max_attempts: config.connect_max_attempts,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn socket_path(&self, shard: ShardId) -> PathBuf {
        Paths::shard_socket_file(&self.socket_dir, shard.0)
    }
}

/// Connection pools for every connected shard.
pub struct Transport {
    config: TransportConfig,
    pools: RwLock<HashMap<ShardId, Arc<ShardPool>>>,
    handlers: Mutex<HashMap<ShardId, Arc<dyn LineHandler>>>,
    events: Option<mpsc::UnboundedSender<ShardEvent>>,
    next_generation: AtomicU64,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            pools: RwLock::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            events: None,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Like [`Transport::new`], reporting listener lifecycle on `events`.
    pub fn with_events(config: TransportConfig, events: mpsc::UnboundedSender<ShardEvent>) -> Self {
        let mut transport = Self::new(config);
        transport.events = Some(events);
        transport
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Wait for the shard's socket, open its pool and install `handler` on
    /// every connection. The handler is kept for [`Transport::restart`].
    pub async fn connect(&self, shard: ShardId, handler: Arc<dyn LineHandler>) -> TransportResult<()> {
        if self.pools.read().contains_key(&shard) {
            return Err(TransportError::AlreadyConnected(shard));
        }
        self.handlers.lock().insert(shard, handler.clone());
        self.open_pool(shard, handler).await
    }

    /// Lease a connection of `shard`, waiting while all are in use.
    pub async fn acquire(&self, shard: ShardId) -> TransportResult<ConnectionLease> {
        self.pool(shard)?.acquire().await
    }

    /// Serialize `frame` and write it on a leased connection of `shard`.
    ///
    /// Waits while every connection of the shard is leased. Returns once the
    /// local write completes; the daemon's verdict arrives later as a frame.
    pub async fn write(&self, frame: &Frame, shard: ShardId) -> TransportResult<()> {
        let line = frame.to_json()?;
        let mut lease = self.acquire(shard).await?;
        lease.write_line(&line).await?;
        debug!(shard = %shard, kind = frame.type_name(), "Frame written");
        Ok(())
    }

    /// Close one shard's pool. Other shards are unaffected.
    /// Returns false if the shard was not connected.
    pub fn stop(&self, shard: ShardId) -> bool {
        let removed = self.pools.write().remove(&shard);
        match removed {
            Some(pool) => {
                pool.close();
                info!(shard = %shard, generation = pool.generation(), "Shard stopped");
                true
            }
            None => false,
        }
    }

    /// Stop and reconnect one shard with its previously installed handler.
    pub async fn restart(&self, shard: ShardId) -> TransportResult<()> {
        let handler = self
            .handlers
            .lock()
            .get(&shard)
            .cloned()
            .ok_or(TransportError::NoHandler(shard))?;
        self.stop(shard);
        info!(shard = %shard, "Restarting shard");
        self.open_pool(shard, handler).await
    }

    /// Close every pool.
    pub fn stop_all(&self) {
        let pools: Vec<_> = self.pools.write().drain().collect();
        for (shard, pool) in pools {
            pool.close();
            debug!(shard = %shard, "Shard stopped");
        }
    }

    pub fn is_connected(&self, shard: ShardId) -> bool {
        self.pools.read().contains_key(&shard)
    }

    pub fn connected_shards(&self) -> Vec<ShardId> {
        let mut shards: Vec<_> = self.pools.read().keys().copied().collect();
        shards.sort();
        shards
    }

    /// Generation of the shard's current pool; changes on every restart.
    pub fn generation(&self, shard: ShardId) -> Option<u64> {
        self.pools.read().get(&shard).map(|p| p.generation())
    }

    /// Connections of the shard not currently leased.
    pub fn available_connections(&self, shard: ShardId) -> Option<usize> {
        self.pools.read().get(&shard).map(|p| p.available())
    }

    fn pool(&self, shard: ShardId) -> TransportResult<Arc<ShardPool>> {
        self.pools
            .read()
            .get(&shard)
            .cloned()
            .ok_or(TransportError::NotConnected(shard))
    }

    async fn open_pool(&self, shard: ShardId, handler: Arc<dyn LineHandler>) -> TransportResult<()> {
        let path = self.config.socket_path(shard);
        wait_for_socket(&path, shard, self.config.poll_interval, self.config.max_attempts).await?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut writers = Vec::with_capacity(self.config.pool_size);
        let mut listeners: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.pool_size);

        for index in 0..self.config.pool_size {
            let stream = match UnixStream::connect(&path).await {
                Ok(stream) => stream,
                Err(e) => {
                    for listener in &listeners {
                        listener.abort();
                    }
                    warn!(shard = %shard, path = %path.display(), error = %e, "Failed to open shard connection");
                    return Err(e.into());
                }
            };
            let (reader, writer) = stream.into_split();
            writers.push(writer);
            listeners.push(tokio::spawn(read_loop(
                shard,
                generation,
                index,
                reader,
                handler.clone(),
                self.events.clone(),
                self.config.max_line_bytes,
            )));
        }

        let pool = Arc::new(ShardPool::new(shard, generation, writers, listeners));
        {
            let mut pools = self.pools.write();
            if pools.contains_key(&shard) {
                pool.close();
                return Err(TransportError::AlreadyConnected(shard));
            }
            pools.insert(shard, pool);
        }

        info!(
            shard = %shard,
            generation,
            pool_size = self.config.pool_size,
            path = %path.display(),
            "Shard connected"
        );
        Ok(())
    }
}

#[async_trait]
impl FrameWriter for Transport {
    async fn write(&self, frame: &Frame, shard: ShardId) -> TransportResult<()> {
        Transport::write(self, frame, shard).await
    }
}

/// Poll for the shard's socket descriptor on a fixed interval.
///
/// A missing socket means the daemon is still starting. Gives up with
/// [`TransportError::ConnectionTimeout`] after `max_attempts` checks.
pub async fn wait_for_socket(
    path: &Path,
    shard: ShardId,
    poll_interval: Duration,
    max_attempts: u32,
) -> TransportResult<()> {
    for attempt in 1..=max_attempts {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            if attempt > 1 {
                debug!(shard = %shard, attempt, "Shard socket appeared");
            }
            return Ok(());
        }
        if attempt < max_attempts {
            tokio::time::sleep(poll_interval).await;
        }
    }

    warn!(shard = %shard, path = %path.display(), max_attempts, "Shard socket never appeared");
    Err(TransportError::ConnectionTimeout {
        shard,
        attempts: max_attempts,
    })
}

/// Read-listener for one connection: every non-empty line goes to `handler`.
///
/// Lines are split on raw bytes so invalid UTF-8 cannot end the loop; only
/// EOF or a read error does, and both are reported as `ConnectionClosed`.
/// A line longer than `max_line_bytes` is dropped whole and reading resumes
/// after its newline.
async fn read_loop(
    shard: ShardId,
    generation: u64,
    connection: usize,
    reader: OwnedReadHalf,
    handler: Arc<dyn LineHandler>,
    events: Option<mpsc::UnboundedSender<ShardEvent>>,
    max_line_bytes: usize,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(4096);
    let limit = max_line_bytes as u64 + 1;
    let mut discarding = false;

    loop {
        buf.clear();
        match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!(shard = %shard, connection, "Daemon closed connection");
                break;
            }
            Ok(_) if buf.last() != Some(&b'\n') && buf.len() > max_line_bytes => {
                if !discarding {
                    warn!(
                        shard = %shard,
                        connection,
                        max_line_bytes,
                        "Dropping oversized line from daemon"
                    );
                }
                discarding = true;
            }
            Ok(_) if discarding => {
                discarding = false;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    handler.handle_line(shard, trimmed.to_string());
                }
            }
            Err(e) => {
                warn!(shard = %shard, connection, error = %e, "Read from daemon failed");
                break;
            }
        }
    }

    if let Some(events) = events {
        let _ = events.send(ShardEvent::ConnectionClosed {
            shard,
            generation,
            connection,
        });
    }
}
