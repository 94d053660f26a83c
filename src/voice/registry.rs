//! Channel registry: trigger set and temporary-channel map behind one lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::model::{ChannelId, GuildId, MemberId, TemporaryChannel, TriggerChannel};
use crate::error::RegistryError;

#[derive(Debug, Default)]
struct RegistryState {
    /// Insertion-ordered; ids are unique.
    triggers: Vec<TriggerChannel>,
    temporary: HashMap<ChannelId, TemporaryChannel>,
}

/// In-memory store for trigger and temporary channels.
///
/// Every operation takes the single lock for the duration of a map access
/// only; callers never hold it across a platform call.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    state: RwLock<RegistryState>,
}

impl ChannelRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a channel as a trigger. Returns `false` if it already was one.
    pub async fn add_trigger(&self, channel_id: ChannelId, guild_id: GuildId) -> bool {
        let mut state = self.state.write().await;
        if state.triggers.iter().any(|t| t.channel_id == channel_id) {
            debug!(channel_id = %channel_id, "Trigger already configured");
            return false;
        }
        state.triggers.push(TriggerChannel {
            channel_id,
            guild_id,
        });
        info!(channel_id = %channel_id, guild_id = %guild_id, "Trigger channel added");
        true
    }

    /// Remove a trigger. Returns whether it was present.
    pub async fn remove_trigger(&self, channel_id: ChannelId) -> bool {
        let mut state = self.state.write().await;
        let before = state.triggers.len();
        state.triggers.retain(|t| t.channel_id != channel_id);
        let removed = state.triggers.len() != before;
        if removed {
            info!(channel_id = %channel_id, "Trigger channel removed");
        }
        removed
    }

    /// Triggers configured in a guild, in the order they were added.
    pub async fn list_triggers(&self, guild_id: GuildId) -> Vec<TriggerChannel> {
        let state = self.state.read().await;
        state
            .triggers
            .iter()
            .filter(|t| t.guild_id == guild_id)
            .cloned()
            .collect()
    }

    /// Every configured trigger across all guilds.
    pub async fn all_triggers(&self) -> Vec<TriggerChannel> {
        self.state.read().await.triggers.clone()
    }

    pub async fn is_trigger(&self, channel_id: ChannelId) -> bool {
        let state = self.state.read().await;
        state.triggers.iter().any(|t| t.channel_id == channel_id)
    }

    /// Start tracking a freshly created channel. An existing entry is never
    /// overwritten.
    pub async fn record_temporary(
        &self,
        channel_id: ChannelId,
        owner_id: MemberId,
        guild_id: GuildId,
        parent_category_id: Option<ChannelId>,
        created_at: DateTime<Utc>,
    ) -> Result<TemporaryChannel, RegistryError> {
        let mut state = self.state.write().await;
        if state.temporary.contains_key(&channel_id) {
            return Err(RegistryError::AlreadyTracked(channel_id));
        }
        let entry = TemporaryChannel {
            channel_id,
            owner_id,
            guild_id,
            created_at,
            parent_category_id,
        };
        state.temporary.insert(channel_id, entry.clone());
        Ok(entry)
    }

    /// Claim a temporary channel: remove and return it. Of any number of
    /// concurrent callers, exactly one gets `Some`.
    pub async fn take_temporary(&self, channel_id: ChannelId) -> Option<TemporaryChannel> {
        self.state.write().await.temporary.remove(&channel_id)
    }

    pub async fn is_temporary(&self, channel_id: ChannelId) -> bool {
        self.state.read().await.temporary.contains_key(&channel_id)
    }

    /// Tracked temporary channels, oldest first.
    pub async fn list_temporary(&self) -> Vec<TemporaryChannel> {
        let state = self.state.read().await;
        let mut channels: Vec<TemporaryChannel> = state.temporary.values().cloned().collect();
        channels.sort_by_key(|c| (c.created_at, c.channel_id));
        channels
    }

    pub async fn trigger_count(&self) -> usize {
        self.state.read().await.triggers.len()
    }

    pub async fn temporary_count(&self) -> usize {
        self.state.read().await.temporary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ch(id: u64) -> ChannelId {
        ChannelId::new(id)
    }

    const GUILD: GuildId = GuildId::new(1);

    #[tokio::test]
    async fn add_trigger_is_idempotent() {
        let registry = ChannelRegistry::new();
        assert!(registry.add_trigger(ch(10), GUILD).await);
        assert!(!registry.add_trigger(ch(10), GUILD).await);
        assert_eq!(registry.list_triggers(GUILD).await.len(), 1);
        assert!(registry.is_trigger(ch(10)).await);
    }

    #[tokio::test]
    async fn remove_trigger_twice_reports_absent() {
        let registry = ChannelRegistry::new();
        registry.add_trigger(ch(10), GUILD).await;
        assert!(registry.remove_trigger(ch(10)).await);
        assert!(!registry.remove_trigger(ch(10)).await);
        assert!(!registry.is_trigger(ch(10)).await);
    }

    #[tokio::test]
    async fn list_triggers_filters_by_guild_in_insertion_order() {
        let registry = ChannelRegistry::new();
        let other = GuildId::new(2);
        registry.add_trigger(ch(30), GUILD).await;
        registry.add_trigger(ch(5), other).await;
        registry.add_trigger(ch(20), GUILD).await;

        let ids: Vec<ChannelId> = registry
            .list_triggers(GUILD)
            .await
            .into_iter()
            .map(|t| t.channel_id)
            .collect();
        assert_eq!(ids, vec![ch(30), ch(20)]);
        assert_eq!(registry.list_triggers(other).await.len(), 1);
        assert_eq!(registry.trigger_count().await, 3);
    }

    #[tokio::test]
    async fn record_temporary_rejects_duplicates_without_overwriting() {
        let registry = ChannelRegistry::new();
        let now = Utc::now();
        registry
            .record_temporary(ch(100), MemberId::new(7), GUILD, None, now)
            .await
            .unwrap();

        let err = registry
            .record_temporary(ch(100), MemberId::new(8), GUILD, Some(ch(3)), now)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyTracked(ch(100)));

        let tracked = registry.list_temporary().await;
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].owner_id, MemberId::new(7));
        assert_eq!(tracked[0].parent_category_id, None);
    }

    #[tokio::test]
    async fn take_temporary_claims_once() {
        let registry = ChannelRegistry::new();
        registry
            .record_temporary(ch(100), MemberId::new(7), GUILD, None, Utc::now())
            .await
            .unwrap();

        let first = registry.take_temporary(ch(100)).await;
        assert_eq!(first.map(|c| c.owner_id), Some(MemberId::new(7)));
        assert!(registry.take_temporary(ch(100)).await.is_none());
        assert!(!registry.is_temporary(ch(100)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_yield_one_winner() {
        for round in 0..50u64 {
            let registry = ChannelRegistry::new();
            let id = ch(1000 + round);
            registry
                .record_temporary(id, MemberId::new(1), GUILD, None, Utc::now())
                .await
                .unwrap();

            let a = tokio::spawn({
                let registry = Arc::clone(&registry);
                async move { registry.take_temporary(id).await }
            });
            let b = tokio::spawn({
                let registry = Arc::clone(&registry);
                async move { registry.take_temporary(id).await }
            });

            let claims = [a.await.unwrap(), b.await.unwrap()];
            assert_eq!(claims.iter().filter(|c| c.is_some()).count(), 1);
        }
    }

    #[tokio::test]
    async fn list_temporary_is_oldest_first() {
        let registry = ChannelRegistry::new();
        let now = Utc::now();
        registry
            .record_temporary(ch(2), MemberId::new(1), GUILD, None, now)
            .await
            .unwrap();
        registry
            .record_temporary(ch(1), MemberId::new(2), GUILD, None, now - Duration::seconds(5))
            .await
            .unwrap();

        let ids: Vec<ChannelId> = registry
            .list_temporary()
            .await
            .into_iter()
            .map(|c| c.channel_id)
            .collect();
        assert_eq!(ids, vec![ch(1), ch(2)]);
        assert_eq!(registry.temporary_count().await, 2);
    }
}
