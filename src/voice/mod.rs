//! Join-to-create voice channels: registry, lifecycle, and admin commands.

pub mod adapter;
pub mod commands;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod testing;

pub use adapter::{PlatformAdapter, VoiceChannelSpec};
pub use commands::{CallerAuthority, CommandReply, CommandSurface};
pub use lifecycle::{ChannelLifecycleManager, ReconcileReport, TransitionOutcome, spawn_reconcile_ticker};
pub use model::{ChannelId, GuildId, MemberId, PresenceTransition, TemporaryChannel, TriggerChannel};
pub use registry::ChannelRegistry;
