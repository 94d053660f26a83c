//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Discord's maximum channel name length, in characters.
pub const MAX_CHANNEL_NAME_CHARS: usize = 100;

/// Placeholder replaced by the member's display name in `name_template`.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Discord's voice bitrate bounds, in bits per second. The upper bound is
/// the highest boost tier.
pub const MIN_BITRATE: u32 = 8_000;
pub const MAX_BITRATE: u32 = 384_000;

/// Discord's maximum voice channel member limit.
pub const MAX_USER_LIMIT: u32 = 99;

/// How temporary channels are created and cleaned up.
#[derive(Debug, Clone)]
pub struct ChannelPolicy {
    /// Name template for new channels; `{name}` is the member's display name.
    pub name_template: String,
    /// Member limit for new channels (0 = unlimited).
    pub user_limit: u32,
    /// Bitrate for new channels, in bits per second.
    pub bitrate: u32,
    /// Audit log reason attached to deletions of empty channels.
    pub delete_reason: String,
    /// Temporary channels younger than this are left alone by the sweep.
    pub reconcile_grace: Duration,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            name_template: "{name}'s Channel".to_string(),
            user_limit: 0,
            bitrate: 64_000,
            delete_reason: "Temporary channel empty".to_string(),
            reconcile_grace: Duration::from_secs(30),
        }
    }
}

impl ChannelPolicy {
    /// Render the channel name for a member, clipped to Discord's limit.
    pub fn channel_name(&self, display_name: &str) -> String {
        let name = self.name_template.replace(NAME_PLACEHOLDER, display_name);
        if name.chars().count() <= MAX_CHANNEL_NAME_CHARS {
            name
        } else {
            name.chars().take(MAX_CHANNEL_NAME_CHARS).collect()
        }
    }

    /// Reject values Discord would refuse when creating a channel.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.name_template.contains(NAME_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue {
                key: "TEMPVOICE_CHANNEL_NAME".into(),
                message: format!("template must contain {NAME_PLACEHOLDER}"),
            });
        }
        if self.user_limit > MAX_USER_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "TEMPVOICE_USER_LIMIT".into(),
                message: format!("must be between 0 and {MAX_USER_LIMIT}"),
            });
        }
        if !(MIN_BITRATE..=MAX_BITRATE).contains(&self.bitrate) {
            return Err(ConfigError::InvalidValue {
                key: "TEMPVOICE_BITRATE".into(),
                message: format!("must be between {MIN_BITRATE} and {MAX_BITRATE}"),
            });
        }
        Ok(())
    }
}

/// Process configuration, read from the environment.
#[derive(Debug)]
pub struct BotConfig {
    /// Discord bot token.
    pub token: SecretString,
    /// Port for the read-only status server.
    pub status_port: u16,
    /// Allowed CORS origins for the status server (`*` = any).
    pub cors_origins: Vec<String>,
    /// Interval between reconciliation sweeps. `None` disables the sweep.
    pub reconcile_interval: Option<Duration>,
    pub policy: ChannelPolicy,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("DISCORD_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DISCORD_BOT_TOKEN".into()))?;

        let status_port = env_parse("TEMPVOICE_STATUS_PORT", 8001u16)?;

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let reconcile_secs = env_parse("TEMPVOICE_RECONCILE_SECS", 300u64)?;
        let reconcile_interval = (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs));

        let defaults = ChannelPolicy::default();
        let name_template =
            std::env::var("TEMPVOICE_CHANNEL_NAME").unwrap_or(defaults.name_template);

        let policy = ChannelPolicy {
            name_template,
            user_limit: env_parse("TEMPVOICE_USER_LIMIT", defaults.user_limit)?,
            bitrate: env_parse("TEMPVOICE_BITRATE", defaults.bitrate)?,
            delete_reason: defaults.delete_reason,
            reconcile_grace: Duration::from_secs(env_parse(
                "TEMPVOICE_RECONCILE_GRACE_SECS",
                defaults.reconcile_grace.as_secs(),
            )?),
        };

        policy.validate()?;

        Ok(Self {
            token: SecretString::from(token),
            status_port,
            cors_origins,
            reconcile_interval,
            policy,
        })
    }
}

/// Parse an optional env var, falling back to `default` when unset.
fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_join_to_create_defaults() {
        let policy = ChannelPolicy::default();
        assert_eq!(policy.user_limit, 0);
        assert_eq!(policy.bitrate, 64_000);
        assert_eq!(policy.channel_name("Alice"), "Alice's Channel");
    }

    #[test]
    fn channel_name_is_clipped_on_char_boundary() {
        let policy = ChannelPolicy::default();
        let long = "é".repeat(150);
        let name = policy.channel_name(&long);
        assert_eq!(name.chars().count(), MAX_CHANNEL_NAME_CHARS);
        assert!(name.chars().all(|c| c == 'é'));
    }

    #[test]
    fn custom_template() {
        let policy = ChannelPolicy {
            name_template: "🔊 {name}".into(),
            ..ChannelPolicy::default()
        };
        assert_eq!(policy.channel_name("Bob"), "🔊 Bob");
    }

    #[test]
    fn default_policy_is_valid() {
        assert!(ChannelPolicy::default().validate().is_ok());
    }

    #[test]
    fn bitrate_outside_discord_range_is_rejected() {
        for bitrate in [0, MIN_BITRATE - 1, MAX_BITRATE + 1] {
            let policy = ChannelPolicy {
                bitrate,
                ..ChannelPolicy::default()
            };
            match policy.validate() {
                Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "TEMPVOICE_BITRATE"),
                other => panic!("bitrate {bitrate} accepted: {other:?}"),
            }
        }
        for bitrate in [MIN_BITRATE, MAX_BITRATE] {
            let policy = ChannelPolicy {
                bitrate,
                ..ChannelPolicy::default()
            };
            assert!(policy.validate().is_ok());
        }
    }

    #[test]
    fn user_limit_and_template_are_checked() {
        let too_many = ChannelPolicy {
            user_limit: MAX_USER_LIMIT + 1,
            ..ChannelPolicy::default()
        };
        assert!(matches!(
            too_many.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "TEMPVOICE_USER_LIMIT"
        ));

        let no_placeholder = ChannelPolicy {
            name_template: "Private room".into(),
            ..ChannelPolicy::default()
        };
        assert!(matches!(
            no_placeholder.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "TEMPVOICE_CHANNEL_NAME"
        ));
    }

    #[test]
    fn env_parse_rejects_garbage() {
        // SAFETY: This test runs in isolation; no other thread reads this var concurrently.
        unsafe { std::env::set_var("TEMPVOICE_TEST_PARSE_GARBAGE", "lots") };
        let err = env_parse("TEMPVOICE_TEST_PARSE_GARBAGE", 1u32).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn env_parse_falls_back_when_unset() {
        // SAFETY: This test runs in isolation; no other thread reads this var concurrently.
        unsafe { std::env::remove_var("TEMPVOICE_TEST_PARSE_UNSET") };
        assert_eq!(env_parse("TEMPVOICE_TEST_PARSE_UNSET", 42u32).unwrap(), 42);
    }
}
