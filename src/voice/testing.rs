//! In-memory platform for exercising the lifecycle without a gateway.
//!
//! [`FakePlatform`] keeps a simulated set of voice channels and their
//! occupants, records every adapter call in order, and can be told to fail
//! individual operations.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::adapter::{PlatformAdapter, VoiceChannelSpec};
use super::model::{ChannelId, GuildId, MemberId};
use crate::error::AdapterError;

/// First id handed out for channels created through the adapter.
pub const FIRST_CREATED_ID: u64 = 900_000;

/// One adapter call, as observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    Create {
        guild_id: GuildId,
        spec: VoiceChannelSpec,
        created: Option<ChannelId>,
    },
    Move {
        member_id: MemberId,
        channel_id: ChannelId,
    },
    Delete {
        channel_id: ChannelId,
        reason: String,
    },
    ListMembers {
        channel_id: ChannelId,
    },
}

#[derive(Debug, Clone)]
struct FakeChannel {
    guild_id: GuildId,
    members: HashSet<MemberId>,
}

/// Operations the fake can be told to fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureSwitches {
    pub create: bool,
    pub move_member: bool,
    pub delete: bool,
    pub list_members: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    channels: HashMap<ChannelId, FakeChannel>,
    calls: Vec<AdapterCall>,
    fail: FailureSwitches,
}

/// Simulated platform implementing [`PlatformAdapter`].
#[derive(Debug)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
    next_id: AtomicU64,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            next_id: AtomicU64::new(FIRST_CREATED_ID),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a pre-existing channel (e.g. a trigger channel).
    pub fn add_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.lock().channels.insert(
            channel_id,
            FakeChannel {
                guild_id,
                members: HashSet::new(),
            },
        );
    }

    /// Remove a channel as if someone deleted it on the platform.
    pub fn remove_channel(&self, channel_id: ChannelId) {
        self.lock().channels.remove(&channel_id);
    }

    /// Put a member into a channel, leaving any other channel in the guild.
    pub fn connect(&self, member_id: MemberId, channel_id: ChannelId) {
        let mut state = self.lock();
        place_member(&mut state, member_id, Some(channel_id));
    }

    /// Disconnect a member from voice entirely.
    pub fn disconnect(&self, member_id: MemberId) {
        let mut state = self.lock();
        place_member(&mut state, member_id, None);
    }

    pub fn set_failures(&self, fail: FailureSwitches) {
        self.lock().fail = fail;
    }

    pub fn exists(&self, channel_id: ChannelId) -> bool {
        self.lock().channels.contains_key(&channel_id)
    }

    pub fn members_of(&self, channel_id: ChannelId) -> HashSet<MemberId> {
        self.lock()
            .channels
            .get(&channel_id)
            .map(|c| c.members.clone())
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.lock().calls.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.count(|c| matches!(c, AdapterCall::Create { .. }))
    }

    pub fn move_calls(&self) -> usize {
        self.count(|c| matches!(c, AdapterCall::Move { .. }))
    }

    pub fn delete_calls(&self) -> usize {
        self.count(|c| matches!(c, AdapterCall::Delete { .. }))
    }

    fn count(&self, pred: impl Fn(&AdapterCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(*c)).count()
    }
}

fn place_member(state: &mut FakeState, member_id: MemberId, target: Option<ChannelId>) {
    for channel in state.channels.values_mut() {
        channel.members.remove(&member_id);
    }
    if let Some(channel) = target.and_then(|id| state.channels.get_mut(&id)) {
        channel.members.insert(member_id);
    }
}

fn injected(op: &str) -> AdapterError {
    AdapterError::CallFailed(format!("injected {op} failure"))
}

#[async_trait]
impl PlatformAdapter for FakePlatform {
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        spec: &VoiceChannelSpec,
    ) -> Result<ChannelId, AdapterError> {
        let mut state = self.lock();
        if state.fail.create {
            state.calls.push(AdapterCall::Create {
                guild_id,
                spec: spec.clone(),
                created: None,
            });
            return Err(injected("create"));
        }
        let id = ChannelId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        state.channels.insert(
            id,
            FakeChannel {
                guild_id,
                members: HashSet::new(),
            },
        );
        state.calls.push(AdapterCall::Create {
            guild_id,
            spec: spec.clone(),
            created: Some(id),
        });
        Ok(id)
    }

    async fn move_member(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        channel_id: ChannelId,
    ) -> Result<(), AdapterError> {
        let mut state = self.lock();
        state.calls.push(AdapterCall::Move {
            member_id,
            channel_id,
        });
        if state.fail.move_member {
            return Err(injected("move"));
        }
        let in_guild = state
            .channels
            .get(&channel_id)
            .is_some_and(|c| c.guild_id == guild_id);
        if !in_guild {
            return Err(AdapterError::NotFound(channel_id));
        }
        place_member(&mut state, member_id, Some(channel_id));
        Ok(())
    }

    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> Result<(), AdapterError> {
        let mut state = self.lock();
        state.calls.push(AdapterCall::Delete {
            channel_id,
            reason: reason.to_string(),
        });
        if state.fail.delete {
            return Err(injected("delete"));
        }
        state
            .channels
            .remove(&channel_id)
            .map(|_| ())
            .ok_or(AdapterError::NotFound(channel_id))
    }

    async fn list_members(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<HashSet<MemberId>, AdapterError> {
        let mut state = self.lock();
        state.calls.push(AdapterCall::ListMembers { channel_id });
        if state.fail.list_members {
            return Err(injected("list_members"));
        }
        state
            .channels
            .get(&channel_id)
            .map(|c| c.members.clone())
            .ok_or(AdapterError::NotFound(channel_id))
    }

    async fn channel_exists(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, AdapterError> {
        Ok(self.lock().channels.contains_key(&channel_id))
    }
}
