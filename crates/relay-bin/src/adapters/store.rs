//! Channel store seeding from `channels.json`.

use relay_config_and_utils::{Config, CoreError, CoreResult};
use relay_ports::{ChannelSeed, InMemoryChannelStore};
use relay_protocol_types::ShardId;
use shard_transport::ShardTiering;
use std::path::Path;
use tracing::{info, warn};

/// Build the in-memory store from the seed file at `path`.
///
/// Channels without a shard are placed by [`ShardTiering`], using their
/// member count as the projected size. A missing file yields an empty store.
pub fn load_channel_store(path: &Path, config: &Config) -> CoreResult<InMemoryChannelStore> {
    let store = InMemoryChannelStore::new();
    if !path.exists() {
        warn!(path = %path.display(), "No channel seed file; starting with no channels");
        return Ok(store);
    }

    let content = std::fs::read_to_string(path)?;
    let seed: ChannelSeed = serde_json::from_str(&content)?;

    if let Some(record) = seed
        .channels
        .iter()
        .find(|c| c.shard.is_some_and(|s| s >= config.shard_count))
    {
        return Err(CoreError::Config(format!(
            "channel {} is pinned to shard {:?} but only {} shards are configured",
            record.phone_number, record.shard, config.shard_count
        )));
    }

    let count = seed.channels.len();
    let tiering = ShardTiering::new(config.shard_count, &config.tiering);
    store.load_seed(seed, |record| -> ShardId {
        let projected = u32::try_from(record.members.len()).unwrap_or(u32::MAX);
        tiering.assign(projected, &store.shard_load())
    });

    info!(path = %path.display(), channels = count, "Channel store seeded");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config_and_utils::TieringConfig;
    use relay_ports::{ChannelRepository, MembershipStore, Role};

    fn config() -> Config {
        Config {
            shard_count: 3,
            tiering: TieringConfig {
                large_channel_threshold: 3,
                large_channel_shards: 1,
            },
            ..Config::default()
        }
    }

    fn write_seed(dir: &Path, seed: serde_json::Value) -> std::path::PathBuf {
        let path = dir.join("channels.json");
        std::fs::write(&path, seed.to_string()).unwrap();
        path
    }

    fn member(number: &str, role: &str) -> serde_json::Value {
        serde_json::json!({ "phone_number": number, "role": role })
    }

    async fn shard_of(store: &InMemoryChannelStore, number: &str) -> ShardId {
        store.find_channel(number).await.unwrap().unwrap().shard
    }

    #[tokio::test]
    async fn seeds_channels_and_assigns_shards_by_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_seed(
            dir.path(),
            serde_json::json!({
                "channels": [
                    { "phone_number": "+1000", "name": "small-a", "members": [member("+1", "admin")] },
                    { "phone_number": "+2000", "name": "small-b", "members": [member("+2", "admin")] },
                    {
                        "phone_number": "+3000",
                        "name": "large",
                        "members": [member("+3", "admin"), member("+4", "subscriber"), member("+5", "subscriber")]
                    },
                    { "phone_number": "+4000", "name": "pinned", "shard": 2 }
                ]
            }),
        );

        let store = load_channel_store(&path, &config()).unwrap();
        assert_eq!(shard_of(&store, "+1000").await, ShardId(0));
        assert_eq!(shard_of(&store, "+2000").await, ShardId(1));
        assert_eq!(shard_of(&store, "+3000").await, ShardId(2));
        assert_eq!(shard_of(&store, "+4000").await, ShardId(2));

        let sender = store.resolve_sender("+3000", "+4").await.unwrap();
        assert_eq!(sender.role, Role::Subscriber);
    }

    #[test]
    fn missing_seed_file_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = load_channel_store(&dir.path().join("channels.json"), &config()).unwrap();
        assert!(store.shard_load().is_empty());
    }

    #[test]
    fn shard_outside_configured_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_seed(
            dir.path(),
            serde_json::json!({ "channels": [{ "phone_number": "+1000", "shard": 7 }] }),
        );
        assert!(matches!(
            load_channel_store(&path, &config()),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn malformed_seed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_channel_store(&path, &config()),
            Err(CoreError::Json(_))
        ));
    }
}
