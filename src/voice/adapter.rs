//! Platform adapter seam: the remote calls the lifecycle manager depends on.

use std::collections::HashSet;

use async_trait::async_trait;

use super::model::{ChannelId, GuildId, MemberId};
use crate::error::AdapterError;

/// Parameters for a new voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannelSpec {
    pub name: String,
    pub category_id: Option<ChannelId>,
    /// 0 = unlimited.
    pub user_limit: u32,
    /// Bits per second.
    pub bitrate: u32,
}

/// Remote chat platform operations.
///
/// Implementations carry their own network timeouts and rate limiting.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Create a voice channel and return its id.
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        spec: &VoiceChannelSpec,
    ) -> Result<ChannelId, AdapterError>;

    /// Move a member (currently in voice) into a channel.
    async fn move_member(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        channel_id: ChannelId,
    ) -> Result<(), AdapterError>;

    /// Delete a channel, recording `reason` in the audit log.
    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> Result<(), AdapterError>;

    /// Members currently connected to a voice channel.
    async fn list_members(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<HashSet<MemberId>, AdapterError>;

    /// Whether the channel still exists on the platform.
    async fn channel_exists(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, AdapterError>;
}
