//! Error types for tempvoice.

use std::fmt;

use crate::voice::model::ChannelId;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Temporary channel {0} is already tracked")]
    AlreadyTracked(ChannelId),
}

/// Errors returned by a platform adapter call.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Platform call failed: {0}")]
    CallFailed(String),

    #[error("Channel {0} not found")]
    NotFound(ChannelId),
}

/// Which adapter call failed, for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterOp {
    CreateVoiceChannel,
    MoveMember,
    DeleteChannel,
    ListMembers,
    ChannelExists,
}

impl fmt::Display for AdapterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateVoiceChannel => "create_voice_channel",
            Self::MoveMember => "move_member",
            Self::DeleteChannel => "delete_channel",
            Self::ListMembers => "list_members",
            Self::ChannelExists => "channel_exists",
        };
        f.write_str(name)
    }
}

/// Failures while driving a channel lifecycle. None of these are fatal.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    AlreadyTracked(#[from] RegistryError),

    #[error("{op} failed (channel: {channel:?}): {source}")]
    AdapterCallFailed {
        op: AdapterOp,
        channel: Option<ChannelId>,
        #[source]
        source: AdapterError,
    },
}

impl LifecycleError {
    pub(crate) fn adapter(op: AdapterOp, channel: Option<ChannelId>, source: AdapterError) -> Self {
        Self::AdapterCallFailed { op, channel, source }
    }

    /// The adapter call that failed, if any.
    pub fn op(&self) -> Option<AdapterOp> {
        match self {
            Self::AlreadyTracked(_) => None,
            Self::AdapterCallFailed { op, .. } => Some(*op),
        }
    }
}

/// Administrative command rejections. These are shown to the caller,
/// not treated as faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("You need 'Manage Channels' permission to use this command.")]
    PermissionDenied,

    #[error("❌ <#{0}> is not a join-to-create channel.")]
    NotConfigured(ChannelId),

    #[error("This command can only be used in a server.")]
    GuildOnly,

    #[error("Please pick a voice channel.")]
    MissingChannel,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}
