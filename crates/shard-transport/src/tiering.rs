//! Shard assignment for new channels.
//!
//! The last `large_channel_shards` shards are reserved for channels expected
//! to reach `large_channel_threshold` subscribers, so their fan-out does not
//! starve the many small channels sharing the remaining shards.

use relay_config_and_utils::TieringConfig;
use relay_protocol_types::ShardId;
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct ShardTiering {
    shard_count: u16,
    large_channel_threshold: u32,
    large_channel_shards: u16,
}

impl ShardTiering {
    pub fn new(shard_count: u16, config: &TieringConfig) -> Self {
        Self {
            shard_count,
            large_channel_threshold: config.large_channel_threshold,
            large_channel_shards: config.large_channel_shards.min(shard_count.saturating_sub(1)),
        }
    }

    pub fn is_large(&self, projected_subscribers: u32) -> bool {
        projected_subscribers >= self.large_channel_threshold
    }

    /// Pick a shard: the tier is chosen by projected size, then the least
    /// loaded shard in that tier wins, lowest index on ties.
    pub fn assign(&self, projected_subscribers: u32, load: &BTreeMap<ShardId, usize>) -> ShardId {
        let tier = self.tier(self.is_large(projected_subscribers));
        tier.map(ShardId)
            .min_by_key(|shard| (load.get(shard).copied().unwrap_or(0), *shard))
            .unwrap_or(ShardId(0))
    }

    fn tier(&self, large: bool) -> Range<u16> {
        let boundary = self.shard_count - self.large_channel_shards;
        if self.large_channel_shards == 0 {
            0..self.shard_count
        } else if large {
            boundary..self.shard_count
        } else {
            0..boundary
        }
    }
}
