//! Configuration management for the relay.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Directory holding one `<shard>/signald.sock` per protocol daemon.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/signald-sockets";

/// Backoff policy for rate-limited frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResendConfig {
    /// Delay before the first resend.
    pub min_interval_ms: u64,
    /// Cap on the doubled delay.
    pub max_interval_ms: u64,
    /// Resends attempted before giving up on a frame.
    pub max_attempts: u32,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2_000,
            max_interval_ms: 256_000,
            max_attempts: 5,
        }
    }
}

impl ResendConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

/// Shard tiering for newly created channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    /// Projected subscriber count at which a channel counts as large.
    pub large_channel_threshold: u32,
    /// Number of trailing shards reserved for large channels.
    pub large_channel_shards: u16,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            large_channel_threshold: 1_000,
            large_channel_shards: 1,
        }
    }
}

/// Main relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Number of protocol daemon shards.
    pub shard_count: u16,
    /// Connections per shard (fixed pool, min = max).
    pub pool_size: usize,
    /// Directory containing the per-shard socket descriptors.
    pub socket_dir: PathBuf,
    /// Interval between checks for a shard's socket descriptor.
    pub connect_poll_interval_ms: u64,
    /// Checks before a shard connect fails with a timeout.
    pub connect_max_attempts: u32,
    /// Default timeout for correlated responses.
    pub callback_timeout_ms: u64,
    /// Timeout for verification responses.
    pub verify_timeout_ms: u64,
    /// Timeout for healthcheck echoes.
    pub healthcheck_timeout_ms: u64,
    /// Resend backoff policy.
    pub resend: ResendConfig,
    /// Shard tiering policy.
    pub tiering: TieringConfig,
    /// The relay's own number, used as sender and recipient of healthchecks.
    pub relay_number: Option<String>,
    /// Cooldown between repeated rate-limit notices to one channel.
    pub notice_cooldown_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            shard_count: 4,
            pool_size: 3,
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            connect_poll_interval_ms: 100,
            connect_max_attempts: 100,
            callback_timeout_ms: 30_000,
            verify_timeout_ms: 30_000,
            healthcheck_timeout_ms: 15_000,
            resend: ResendConfig::default(),
            tiering: TieringConfig::default(),
            relay_number: None,
            notice_cooldown_ms: 60_000,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the base directory, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        Self::load_from(&paths.config_file())
    }

    /// Like [`Config::load`], reading `config_path` instead of the default
    /// location.
    pub fn load_from(config_path: &Path) -> CoreResult<Self> {
        let mut config = if config_path.exists() {
            Self::load_from_file(config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.shard_count == 0 {
            return Err(CoreError::Config("shard_count must be at least 1".into()));
        }
        if self.pool_size == 0 {
            return Err(CoreError::Config("pool_size must be at least 1".into()));
        }
        if self.resend.max_attempts == 0 {
            return Err(CoreError::Config(
                "resend.max_attempts must be at least 1".into(),
            ));
        }
        if self.tiering.large_channel_shards >= self.shard_count {
            return Err(CoreError::Config(format!(
                "tiering.large_channel_shards ({}) must be below shard_count ({})",
                self.tiering.large_channel_shards, self.shard_count
            )));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("RELAY_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(count) = std::env::var("RELAY_SHARD_COUNT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.shard_count = count;
        }
        if let Some(size) = std::env::var("RELAY_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.pool_size = size;
        }
        if let Ok(dir) = std::env::var("RELAY_SOCKET_DIR") {
            self.socket_dir = PathBuf::from(dir);
        }
        if let Ok(number) = std::env::var("RELAY_DIAGNOSTICS_NUMBER") {
            if !number.trim().is_empty() {
                self.relay_number = Some(number.trim().to_string());
            }
        }
    }

    pub fn connect_poll_interval(&self) -> Duration {
        Duration::from_millis(self.connect_poll_interval_ms)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn healthcheck_timeout(&self) -> Duration {
        Duration::from_millis(self.healthcheck_timeout_ms)
    }

    pub fn notice_cooldown(&self) -> Duration {
        Duration::from_millis(self.notice_cooldown_ms)
    }
}
