//! Fixed-size connection pool for one shard.
//!
//! A semaphore with one permit per connection gates access; the write halves
//! of idle connections sit on a stack. Holding a [`ConnectionLease`] means
//! holding both a permit and a connection, and dropping it gives both back.

use crate::error::{TransportError, TransportResult};
use parking_lot::Mutex;
use relay_protocol_types::ShardId;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

/// Connections of one shard, with their read-listeners.
pub struct ShardPool {
    shard: ShardId,
    generation: u64,
    size: usize,
    semaphore: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<OwnedWriteHalf>>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl ShardPool {
    /// Build a pool from already-connected write halves. `listeners` are the
    /// read tasks for the same connections; they are aborted on close.
    pub fn new(
        shard: ShardId,
        generation: u64,
        writers: Vec<OwnedWriteHalf>,
        listeners: Vec<JoinHandle<()>>,
    ) -> Self {
        let size = writers.len();
        Self {
            shard,
            generation,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(writers)),
            listeners: Mutex::new(listeners),
        }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not currently leased.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Wait for a free connection. Fails once the pool is closed.
    pub async fn acquire(&self) -> TransportResult<ConnectionLease> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::ShardStopped(self.shard))?;

        let writer = self
            .idle
            .lock()
            .pop()
            .ok_or(TransportError::ShardStopped(self.shard))?;

        Ok(ConnectionLease {
            shard: self.shard,
            writer: Some(writer),
            idle: self.idle.clone(),
            semaphore: self.semaphore.clone(),
            _permit: permit,
        })
    }

    /// Fail pending acquirers, shut idle connections and stop the listeners.
    /// Leased connections are shut when their lease drops.
    pub fn close(&self) {
        if self.semaphore.is_closed() {
            return;
        }
        self.semaphore.close();
        self.idle.lock().clear();
        for listener in self.listeners.lock().drain(..) {
            listener.abort();
        }
        debug!(shard = %self.shard, generation = self.generation, "Shard pool closed");
    }
}

impl Drop for ShardPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exclusive use of one connection until dropped.
pub struct ConnectionLease {
    shard: ShardId,
    writer: Option<OwnedWriteHalf>,
    idle: Arc<Mutex<Vec<OwnedWriteHalf>>>,
    semaphore: Arc<Semaphore>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionLease {
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Write one line (a newline is appended) and flush.
    pub async fn write_line(&mut self, line: &str) -> TransportResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(TransportError::ShardStopped(self.shard))?;

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        // Return the connection before the permit (dropped after this body).
        if let Some(writer) = self.writer.take() {
            if !self.semaphore.is_closed() {
                self.idle.lock().push(writer);
            }
        }
    }
}
