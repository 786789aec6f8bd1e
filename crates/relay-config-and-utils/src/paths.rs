//! File system paths for the relay.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Socket filename inside each shard's directory.
const SHARD_SOCKET_NAME: &str = "signald.sock";

/// Manages file system paths for the relay.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for relay runtime files (~/.signal-relay)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.signal-relay`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".signal-relay"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.signal-relay).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.signal-relay/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the PID file path (~/.signal-relay/relay.pid).
    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("relay.pid")
    }

    /// Get the channel seed file (~/.signal-relay/channels.json).
    pub fn channels_file(&self) -> PathBuf {
        self.base_dir.join("channels.json")
    }

    /// Get the logs directory (~/.signal-relay/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the relay log file path (~/.signal-relay/logs/relay.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("relay.jsonl")
    }

    /// Socket descriptor of one protocol daemon shard: `<socket_dir>/<shard>/signald.sock`.
    pub fn shard_socket_file(socket_dir: &Path, shard: u16) -> PathBuf {
        socket_dir.join(shard.to_string()).join(SHARD_SOCKET_NAME)
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
