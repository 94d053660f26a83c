//! Voice channel data model: snowflake ids, trigger and temporary channels,
//! and the presence transitions that drive them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        // Snowflakes overflow JavaScript numbers, so they go over the wire as strings.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }
    };
}

snowflake_id!(
    /// A Discord channel (voice channel or category).
    ChannelId
);
snowflake_id!(
    /// A Discord guild (server).
    GuildId
);
snowflake_id!(
    /// A guild member (user id).
    MemberId
);

/// A channel configured to spawn temporary children when joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerChannel {
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
}

/// An auto-created voice channel, tracked until it is observed empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporaryChannel {
    pub channel_id: ChannelId,
    /// Member whose join created the channel.
    pub owner_id: MemberId,
    pub guild_id: GuildId,
    pub created_at: DateTime<Utc>,
    /// Category the channel was created under (the trigger's category).
    pub parent_category_id: Option<ChannelId>,
}

/// A member's voice membership change. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTransition {
    pub member_id: MemberId,
    pub guild_id: GuildId,
    pub before_channel_id: Option<ChannelId>,
    pub after_channel_id: Option<ChannelId>,
    /// Display name used to name a spawned channel.
    pub member_display_name: String,
    /// Category of `after_channel_id`, when the member joined a channel inside one.
    pub after_parent_id: Option<ChannelId>,
}

impl PresenceTransition {
    /// Whether the member actually changed channel. Mute, deafen and
    /// re-delivered updates keep the same channel on both sides.
    pub fn changed_channel(&self) -> bool {
        self.before_channel_id != self.after_channel_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_strings() {
        let id = ChannelId::new(1_234_567_890_123_456_789);
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"1234567890123456789\""
        );
    }

    #[test]
    fn trigger_channel_json_shape() {
        let trigger = TriggerChannel {
            channel_id: ChannelId::new(10),
            guild_id: GuildId::new(20),
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["channel_id"], "10");
        assert_eq!(json["guild_id"], "20");
    }

    #[test]
    fn same_channel_is_not_a_change() {
        let event = PresenceTransition {
            member_id: MemberId::new(1),
            guild_id: GuildId::new(2),
            before_channel_id: Some(ChannelId::new(3)),
            after_channel_id: Some(ChannelId::new(3)),
            member_display_name: "Alice".into(),
            after_parent_id: None,
        };
        assert!(!event.changed_channel());

        let left = PresenceTransition {
            after_channel_id: None,
            ..event
        };
        assert!(left.changed_channel());
    }
}
