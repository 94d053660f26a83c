//! Discord event handler for serenity.
//!
//! Turns voice state updates into presence transitions, slash commands into
//! trigger administration, and channel deletions into registry cleanup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serenity::{
    all::{
        ChannelType, Command, CommandDataOptionValue, CommandInteraction, CommandOptionType,
        Context, CreateCommand, CreateCommandOption, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseMessage, EventHandler, GatewayIntents, Guild, GuildChannel,
        Interaction, Message, Permissions, Ready, UnavailableGuild, VoiceState,
    },
    async_trait,
};
use tracing::{debug, error, info, warn};

use super::adapter::SerenityAdapter;
use crate::config::ChannelPolicy;
use crate::error::CommandError;
use crate::status::{GuildSummary, StatusBoard};
use crate::voice::commands::{LIST_COLOUR, LIST_TITLE};
use crate::voice::{
    CallerAuthority, ChannelId, ChannelLifecycleManager, ChannelRegistry, CommandReply,
    CommandSurface, GuildId, MemberId, PlatformAdapter, PresenceTransition,
    spawn_reconcile_ticker,
};

/// Manager and command surface bound to the gateway's HTTP client and cache.
struct Bound {
    manager: Arc<ChannelLifecycleManager>,
    commands: CommandSurface,
}

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    registry: Arc<ChannelRegistry>,
    policy: ChannelPolicy,
    reconcile_interval: Option<Duration>,
    status: Arc<StatusBoard>,
    bound: OnceLock<Bound>,
    sweeper_started: AtomicBool,
}

impl DiscordHandler {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        policy: ChannelPolicy,
        reconcile_interval: Option<Duration>,
        status: Arc<StatusBoard>,
    ) -> Self {
        Self {
            registry,
            policy,
            reconcile_interval,
            status,
            bound: OnceLock::new(),
            sweeper_started: AtomicBool::new(false),
        }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES
    }

    fn bound(&self, ctx: &Context) -> &Bound {
        self.bound.get_or_init(|| {
            let adapter: Arc<dyn PlatformAdapter> = Arc::new(SerenityAdapter::from_context(ctx));
            Bound {
                manager: Arc::new(ChannelLifecycleManager::new(
                    Arc::clone(&self.registry),
                    Arc::clone(&adapter),
                    self.policy.clone(),
                )),
                commands: CommandSurface::new(Arc::clone(&self.registry), adapter),
            }
        })
    }

    async fn dispatch_command(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
    ) -> Result<CommandReply, CommandError> {
        let guild_id = command
            .guild_id
            .map(|g| GuildId::new(g.get()))
            .ok_or(CommandError::GuildOnly)?;
        let authority = CallerAuthority {
            manage_channels: command
                .member
                .as_ref()
                .and_then(|m| m.permissions)
                .is_some_and(|p| p.manage_channels()),
        };
        let commands = &self.bound(ctx).commands;

        match command.data.name.as_str() {
            "setup" => {
                let channel = channel_option(command)?;
                commands.configure_trigger(channel, guild_id, authority).await
            }
            "remove" => {
                let channel = channel_option(command)?;
                commands.remove_trigger(channel, authority).await
            }
            "list" => Ok(commands.list_triggers(guild_id).await),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

/// Slash commands registered on ready.
pub fn slash_commands() -> Vec<CreateCommand> {
    let channel_arg = |description: &str| {
        CreateCommandOption::new(CommandOptionType::Channel, "channel", description)
            .required(true)
            .channel_types(vec![ChannelType::Voice])
    };

    vec![
        CreateCommand::new("setup")
            .description("Setup a join-to-create voice channel")
            .default_member_permissions(Permissions::MANAGE_CHANNELS)
            .add_option(channel_arg("Voice channel members join to get their own channel")),
        CreateCommand::new("remove")
            .description("Remove a join-to-create voice channel")
            .default_member_permissions(Permissions::MANAGE_CHANNELS)
            .add_option(channel_arg("Join-to-create channel to remove")),
        CreateCommand::new("list").description("List all join-to-create channels"),
    ]
}

fn channel_option(command: &CommandInteraction) -> Result<ChannelId, CommandError> {
    command
        .data
        .options
        .iter()
        .find(|o| o.name == "channel")
        .and_then(|o| match o.value {
            CommandDataOptionValue::Channel(id) => Some(ChannelId::new(id.get())),
            _ => None,
        })
        .ok_or(CommandError::MissingChannel)
}

fn response_for(result: &Result<CommandReply, CommandError>) -> CreateInteractionResponse {
    let message = match result {
        Ok(reply) if reply.is_listing() => CreateInteractionResponseMessage::new().embed(
            CreateEmbed::new()
                .title(LIST_TITLE)
                .description(reply.render())
                .colour(LIST_COLOUR),
        ),
        Ok(reply) => CreateInteractionResponseMessage::new().content(reply.render()),
        Err(e) => CreateInteractionResponseMessage::new().content(e.to_string()),
    };
    CreateInteractionResponse::Message(message.ephemeral(true))
}

/// Build a presence transition from a voice state update. `None` outside guilds.
fn presence_transition(
    ctx: &Context,
    old: Option<&VoiceState>,
    new: &VoiceState,
) -> Option<PresenceTransition> {
    let guild_id = new.guild_id?;
    let after = new.channel_id;

    let after_parent_id = after.and_then(|channel| {
        ctx.cache
            .guild(guild_id)
            .and_then(|guild| guild.channels.get(&channel).and_then(|c| c.parent_id))
    });

    let member_display_name = new
        .member
        .as_ref()
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| new.user_id.to_string());

    Some(PresenceTransition {
        member_id: MemberId::new(new.user_id.get()),
        guild_id: GuildId::new(guild_id.get()),
        before_channel_id: old
            .and_then(|vs| vs.channel_id)
            .map(|c| ChannelId::new(c.get())),
        after_channel_id: after.map(|c| ChannelId::new(c.get())),
        member_display_name,
        after_parent_id: after_parent_id.map(|c| ChannelId::new(c.get())),
    })
}

fn guild_summary(guild: &Guild) -> GuildSummary {
    GuildSummary {
        id: GuildId::new(guild.id.get()),
        name: guild.name.clone(),
        member_count: guild.member_count,
        icon: guild.icon_url(),
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
        self.status
            .mark_ready(ready.user.name.clone(), ready.user.avatar_url())
            .await;

        let bound = self.bound(&ctx);
        if let Some(interval) = self.reconcile_interval {
            if !self.sweeper_started.swap(true, Ordering::SeqCst) {
                let _sweeper = spawn_reconcile_ticker(Arc::clone(&bound.manager), interval);
                info!(interval_secs = interval.as_secs(), "Reconciliation sweep started");
            }
        }

        match Command::set_global_commands(&ctx.http, slash_commands()).await {
            Ok(synced) => info!(count = synced.len(), "Synced slash commands"),
            Err(e) => error!(error = %e, "Failed to sync slash commands"),
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(event) = presence_transition(&ctx, old.as_ref(), &new) else {
            return;
        };
        let outcome = self.bound(&ctx).manager.on_presence_transition(&event).await;
        for failure in &outcome.failures {
            warn!(
                member_id = %event.member_id,
                guild_id = %event.guild_id,
                error = %failure,
                "Presence transition partially failed"
            );
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        let result = self.dispatch_command(&ctx, &command).await;
        match &result {
            Ok(_) => info!(command = %command.data.name, user_id = %command.user.id, "Command handled"),
            Err(e) => debug!(command = %command.data.name, user_id = %command.user.id, reason = %e, "Command rejected"),
        }

        if let Err(e) = command.create_response(&ctx.http, response_for(&result)).await {
            warn!(error = %e, "failed to send command response");
        }
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        let channel_id = ChannelId::new(channel.id.get());
        self.bound(&ctx).manager.on_channel_deleted(channel_id).await;
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        debug!(guild_id = %guild.id, members = guild.member_count, "Guild available");
        self.status.upsert_guild(guild_summary(&guild)).await;
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if self.status.remove_guild(GuildId::new(incomplete.id.get())).await {
            info!(guild_id = %incomplete.id, unavailable = incomplete.unavailable, "Guild removed");
        }
    }

    async fn cache_ready(&self, _ctx: Context, guilds: Vec<serenity::all::GuildId>) {
        debug!(guild_count = guilds.len(), "discord cache ready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_cover_voice_states() {
        let intents = DiscordHandler::intents();
        assert!(intents.contains(GatewayIntents::GUILD_VOICE_STATES));
        assert!(intents.contains(GatewayIntents::GUILDS));
        assert!(!intents.contains(GatewayIntents::MESSAGE_CONTENT));
    }

    #[test]
    fn registers_three_commands() {
        assert_eq!(slash_commands().len(), 3);
    }
}
