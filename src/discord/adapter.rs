//! Serenity-backed platform adapter.
//!
//! Writes go through the HTTP client; membership and existence checks read
//! the gateway cache, which serenity updates before dispatching events.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::{
    all::{Cache, ChannelType, Context, CreateChannel, Http, UserId},
    http::HttpError,
};

use crate::error::AdapterError;
use crate::voice::{ChannelId, GuildId, MemberId, PlatformAdapter, VoiceChannelSpec};

/// [`PlatformAdapter`] over a serenity HTTP client and cache.
#[derive(Clone)]
pub struct SerenityAdapter {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityAdapter {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    pub fn from_context(ctx: &Context) -> Self {
        Self::new(Arc::clone(&ctx.http), Arc::clone(&ctx.cache))
    }

    /// `None` when the guild is not cached.
    fn cached_members(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Option<Result<HashSet<MemberId>, AdapterError>> {
        let guild = self.cache.guild(to_guild(guild_id))?;
        let channel = to_channel(channel_id);
        if !guild.channels.contains_key(&channel) {
            return Some(Err(AdapterError::NotFound(channel_id)));
        }
        let members = guild
            .voice_states
            .values()
            .filter(|vs| vs.channel_id == Some(channel))
            .map(|vs| MemberId::new(vs.user_id.get()))
            .collect();
        Some(Ok(members))
    }

    fn cached_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<bool> {
        let guild = self.cache.guild(to_guild(guild_id))?;
        Some(guild.channels.contains_key(&to_channel(channel_id)))
    }
}

pub(crate) fn to_channel(id: ChannelId) -> serenity::all::ChannelId {
    serenity::all::ChannelId::new(id.get())
}

pub(crate) fn to_guild(id: GuildId) -> serenity::all::GuildId {
    serenity::all::GuildId::new(id.get())
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) if resp.status_code.as_u16() == 404
    )
}

fn map_err(channel_id: Option<ChannelId>, err: serenity::Error) -> AdapterError {
    match channel_id {
        Some(id) if is_not_found(&err) => AdapterError::NotFound(id),
        _ => AdapterError::CallFailed(err.to_string()),
    }
}

#[async_trait]
impl PlatformAdapter for SerenityAdapter {
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        spec: &VoiceChannelSpec,
    ) -> Result<ChannelId, AdapterError> {
        let mut builder = CreateChannel::new(spec.name.clone())
            .kind(ChannelType::Voice)
            .user_limit(spec.user_limit)
            .bitrate(spec.bitrate);
        if let Some(category) = spec.category_id {
            builder = builder.category(to_channel(category));
        }

        let channel = to_guild(guild_id)
            .create_channel(&self.http, builder)
            .await
            .map_err(|e| map_err(None, e))?;
        Ok(ChannelId::new(channel.id.get()))
    }

    async fn move_member(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        channel_id: ChannelId,
    ) -> Result<(), AdapterError> {
        to_guild(guild_id)
            .move_member(&self.http, UserId::new(member_id.get()), to_channel(channel_id))
            .await
            .map(|_| ())
            .map_err(|e| map_err(Some(channel_id), e))
    }

    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> Result<(), AdapterError> {
        self.http
            .delete_channel(to_channel(channel_id), Some(reason))
            .await
            .map(|_| ())
            .map_err(|e| map_err(Some(channel_id), e))
    }

    async fn list_members(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<HashSet<MemberId>, AdapterError> {
        // Voice occupancy is only delivered over the gateway.
        self.cached_members(guild_id, channel_id).unwrap_or_else(|| {
            Err(AdapterError::CallFailed(format!(
                "guild {guild_id} is not cached"
            )))
        })
    }

    async fn channel_exists(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, AdapterError> {
        if let Some(exists) = self.cached_exists(guild_id, channel_id) {
            return Ok(exists);
        }
        match self.http.get_channel(to_channel(channel_id)).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_err(None, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_conversion_keeps_snowflake() {
        let id = ChannelId::new(1_180_000_000_000_000_001);
        assert_eq!(to_channel(id).get(), id.get());
        assert_eq!(to_guild(GuildId::new(42)).get(), 42);
    }
}
