//! Administrative commands for trigger channels.
//!
//! Authority is decided by the caller's platform permissions; this module
//! only enforces the result of that check and renders user-facing replies.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::adapter::PlatformAdapter;
use super::model::{ChannelId, GuildId, TriggerChannel};
use super::registry::ChannelRegistry;
use crate::error::CommandError;

/// Embed title for the trigger list.
pub const LIST_TITLE: &str = "Join-to-Create Channels";
/// Embed colour for the trigger list.
pub const LIST_COLOUR: u32 = 0x13b2fb;

/// What the invoking member may do in the guild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerAuthority {
    pub manage_channels: bool,
}

impl CallerAuthority {
    pub const fn manager() -> Self {
        Self {
            manage_channels: true,
        }
    }

    fn require_manage_channels(self) -> Result<(), CommandError> {
        if self.manage_channels {
            Ok(())
        } else {
            Err(CommandError::PermissionDenied)
        }
    }
}

/// Successful command result, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    TriggerConfigured(ChannelId),
    TriggerRemoved(ChannelId),
    Triggers(Vec<TriggerChannel>),
}

impl CommandReply {
    /// Reply text. For a non-empty trigger list this is the embed body.
    pub fn render(&self) -> String {
        match self {
            Self::TriggerConfigured(id) => format!("✅ <#{id}> is now a join-to-create channel!"),
            Self::TriggerRemoved(id) => format!("✅ <#{id}> is no longer a join-to-create channel!"),
            Self::Triggers(triggers) if triggers.is_empty() => {
                "No join-to-create channels configured in this server.".to_string()
            }
            Self::Triggers(triggers) => triggers
                .iter()
                .map(|t| format!("• <#{}>", t.channel_id))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether the reply is best shown as the trigger list embed.
    pub fn is_listing(&self) -> bool {
        matches!(self, Self::Triggers(triggers) if !triggers.is_empty())
    }
}

/// Trigger channel administration, serialized with the lifecycle through
/// the shared registry.
pub struct CommandSurface {
    registry: Arc<ChannelRegistry>,
    adapter: Arc<dyn PlatformAdapter>,
}

impl CommandSurface {
    pub fn new(registry: Arc<ChannelRegistry>, adapter: Arc<dyn PlatformAdapter>) -> Self {
        Self { registry, adapter }
    }

    /// `/setup`: make a channel a trigger.
    pub async fn configure_trigger(
        &self,
        channel_id: ChannelId,
        guild_id: GuildId,
        authority: CallerAuthority,
    ) -> Result<CommandReply, CommandError> {
        authority.require_manage_channels().inspect_err(|_| {
            debug!(channel_id = %channel_id, "setup rejected: missing Manage Channels");
        })?;
        if !self.registry.add_trigger(channel_id, guild_id).await {
            debug!(channel_id = %channel_id, "setup on an existing trigger");
        }
        Ok(CommandReply::TriggerConfigured(channel_id))
    }

    /// `/remove`: stop treating a channel as a trigger.
    pub async fn remove_trigger(
        &self,
        channel_id: ChannelId,
        authority: CallerAuthority,
    ) -> Result<CommandReply, CommandError> {
        authority.require_manage_channels().inspect_err(|_| {
            debug!(channel_id = %channel_id, "remove rejected: missing Manage Channels");
        })?;
        if self.registry.remove_trigger(channel_id).await {
            Ok(CommandReply::TriggerRemoved(channel_id))
        } else {
            Err(CommandError::NotConfigured(channel_id))
        }
    }

    /// `/list`: triggers in a guild. Triggers whose channel is gone are
    /// pruned before listing.
    pub async fn list_triggers(&self, guild_id: GuildId) -> CommandReply {
        let mut live = Vec::new();
        for trigger in self.registry.list_triggers(guild_id).await {
            match self
                .adapter
                .channel_exists(trigger.guild_id, trigger.channel_id)
                .await
            {
                Ok(false) => {
                    if self.registry.remove_trigger(trigger.channel_id).await {
                        info!(channel_id = %trigger.channel_id, "Pruned stale trigger channel");
                    }
                }
                Ok(true) => live.push(trigger),
                Err(e) => {
                    // Unknown is not gone; keep it listed.
                    warn!(channel_id = %trigger.channel_id, error = %e, "Could not verify trigger channel");
                    live.push(trigger);
                }
            }
        }
        CommandReply::Triggers(live)
    }
}
