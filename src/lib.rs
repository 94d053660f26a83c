//! tempvoice: join-to-create voice channels for Discord.

pub mod config;
pub mod discord;
pub mod error;
pub mod status;
pub mod voice;
