//! Discord binding: serenity adapter and gateway event handler.

pub mod adapter;
pub mod handler;

pub use adapter::SerenityAdapter;
pub use handler::DiscordHandler;
