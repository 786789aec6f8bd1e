//! In-memory channel and membership store.
//!
//! Backs the binary when no relational store is wired in, and every test
//! that needs channel state.

use crate::error::{PortError, PortResult};
use crate::ports::{ChannelRepository, MembershipStore};
use crate::types::{Channel, Deauthorization, Member, Role, Sender, DEFAULT_LANGUAGE};
use async_trait::async_trait;
use parking_lot::RwLock;
use relay_protocol_types::ShardId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Seed file format: one record per channel with its members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelSeed {
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub phone_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message_expiry_time: u64,
    /// Assigned by shard tiering when absent.
    #[serde(default)]
    pub shard: Option<u16>,
    #[serde(default)]
    pub members: Vec<MemberRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub phone_number: String,
    pub role: Role,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Default)]
struct State {
    channels: BTreeMap<String, Channel>,
    /// Keyed by (channel, member); ordered so listings are deterministic.
    members: BTreeMap<(String, String), Member>,
    deauthorizations: HashSet<Deauthorization>,
}

/// Channel repository and membership store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryChannelStore {
    state: RwLock<State>,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a channel.
    pub fn insert_channel(&self, channel: Channel) {
        self.state
            .write()
            .channels
            .insert(channel.phone_number.clone(), channel);
    }

    /// Insert or replace a membership.
    pub fn insert_member(&self, member: Member) {
        let key = (
            member.channel_phone_number.clone(),
            member.member_phone_number.clone(),
        );
        self.state.write().members.insert(key, member);
    }

    /// Convenience for tests: add a member with the default language.
    pub fn add_member(&self, channel: &str, member: &str, role: Role) {
        self.insert_member(Member {
            channel_phone_number: channel.to_string(),
            member_phone_number: member.to_string(),
            role,
            language: DEFAULT_LANGUAGE.to_string(),
        });
    }

    /// Load seed records; `assign` picks a shard for records without one.
    pub fn load_seed<F>(&self, seed: ChannelSeed, mut assign: F)
    where
        F: FnMut(&ChannelRecord) -> ShardId,
    {
        for record in seed.channels {
            let shard = match record.shard {
                Some(shard) => ShardId(shard),
                None => assign(&record),
            };
            self.insert_channel(Channel {
                phone_number: record.phone_number.clone(),
                name: record.name.clone(),
                message_expiry_time: record.message_expiry_time,
                shard,
            });
            for member in &record.members {
                self.insert_member(Member {
                    channel_phone_number: record.phone_number.clone(),
                    member_phone_number: member.phone_number.clone(),
                    role: member.role,
                    language: member.language.clone(),
                });
            }
        }
    }

    /// Number of channels per shard.
    pub fn shard_load(&self) -> BTreeMap<ShardId, usize> {
        let mut load = BTreeMap::new();
        for channel in self.state.read().channels.values() {
            *load.entry(channel.shard).or_insert(0) += 1;
        }
        load
    }

    /// Recorded deauthorizations, for inspection.
    pub fn deauthorizations(&self) -> Vec<Deauthorization> {
        self.state.read().deauthorizations.iter().cloned().collect()
    }

    /// Current membership, if any.
    pub fn member(&self, channel: &str, member: &str) -> Option<Member> {
        self.state
            .read()
            .members
            .get(&(channel.to_string(), member.to_string()))
            .cloned()
    }

    fn members_where(&self, channel: &str, filter: impl Fn(&Member) -> bool) -> Vec<Member> {
        self.state
            .read()
            .members
            .values()
            .filter(|m| m.channel_phone_number == channel && filter(m))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelStore {
    async fn find_channel(&self, phone_number: &str) -> PortResult<Option<Channel>> {
        Ok(self.state.read().channels.get(phone_number).cloned())
    }

    async fn list_channels(&self) -> PortResult<Vec<Channel>> {
        Ok(self.state.read().channels.values().cloned().collect())
    }

    async fn update_expiry(&self, phone_number: &str, expiry_secs: u64) -> PortResult<()> {
        let mut state = self.state.write();
        let channel = state
            .channels
            .get_mut(phone_number)
            .ok_or_else(|| PortError::NotFound(format!("channel {}", phone_number)))?;
        channel.message_expiry_time = expiry_secs;
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for InMemoryChannelStore {
    async fn resolve_sender(&self, channel: &str, member: &str) -> PortResult<Sender> {
        Ok(match self.member(channel, member) {
            Some(found) => Sender {
                phone_number: found.member_phone_number,
                role: found.role,
                language: found.language,
            },
            None => Sender::unknown(member),
        })
    }

    async fn list_admins(&self, channel: &str) -> PortResult<Vec<Member>> {
        Ok(self.members_where(channel, |m| m.role == Role::Admin))
    }

    async fn list_members(&self, channel: &str) -> PortResult<Vec<Member>> {
        Ok(self.members_where(channel, |_| true))
    }

    async fn remove_membership(&self, channel: &str, member: &str) -> PortResult<()> {
        self.state
            .write()
            .members
            .remove(&(channel.to_string(), member.to_string()))
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("member {} of {}", member, channel)))
    }

    async fn has_deauthorization(
        &self,
        channel: &str,
        member: &str,
        fingerprint: &str,
    ) -> PortResult<bool> {
        Ok(self.state.read().deauthorizations.iter().any(|d| {
            d.channel_phone_number == channel
                && d.member_phone_number == member
                && d.fingerprint == fingerprint
        }))
    }

    async fn record_deauthorization(&self, record: Deauthorization) -> PortResult<()> {
        self.state.write().deauthorizations.insert(record);
        Ok(())
    }
}
