//! Temporary channel lifecycle: NonExistent → Creating → Active → Deleting → NonExistent.
//!
//! The manager reacts to presence transitions. Joining a trigger channel
//! creates a channel, tracks it and moves the member into it; leaving a
//! tracked channel that is now empty claims it from the registry and
//! deletes it. Platform calls are made outside the registry lock, so the
//! registry's duplicate check and single-claim removal are what keep
//! concurrent handlers from double-creating or double-deleting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::adapter::{PlatformAdapter, VoiceChannelSpec};
use super::model::{ChannelId, GuildId, PresenceTransition, TemporaryChannel};
use super::registry::ChannelRegistry;
use crate::config::ChannelPolicy;
use crate::error::{AdapterError, AdapterOp, LifecycleError};

/// What one presence transition did.
#[derive(Debug, Default)]
pub struct TransitionOutcome {
    /// Channel spawned for the member, if any. Present even when the move failed.
    pub created: Option<TemporaryChannel>,
    /// Channel deleted because the member left it empty.
    pub deleted: Option<TemporaryChannel>,
    pub failures: Vec<LifecycleError>,
}

/// What one reconciliation sweep repaired.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Triggers whose channel no longer exists.
    pub pruned_triggers: Vec<ChannelId>,
    /// Temporary channels deleted on the platform by someone else.
    pub forgotten: Vec<ChannelId>,
    /// Empty temporary channels deleted by the sweep.
    pub deleted: Vec<ChannelId>,
    pub failures: Vec<LifecycleError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.pruned_triggers.is_empty()
            && self.forgotten.is_empty()
            && self.deleted.is_empty()
            && self.failures.is_empty()
    }
}

/// Result of checking a tracked channel for emptiness.
#[derive(Debug)]
enum Release {
    Occupied,
    /// Gone from the platform already; dropped from the registry.
    Vanished,
    /// Another task claimed it first.
    AlreadyClaimed,
    Deleted(TemporaryChannel),
}

/// Drives temporary channels through their lifecycle.
pub struct ChannelLifecycleManager {
    registry: Arc<ChannelRegistry>,
    adapter: Arc<dyn PlatformAdapter>,
    policy: ChannelPolicy,
}

impl ChannelLifecycleManager {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        adapter: Arc<dyn PlatformAdapter>,
        policy: ChannelPolicy,
    ) -> Self {
        Self {
            registry,
            adapter,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Apply one presence transition.
    ///
    /// Joining a trigger and leaving a temporary channel are evaluated
    /// independently; a member hopping straight from one to the other
    /// triggers both.
    pub async fn on_presence_transition(&self, event: &PresenceTransition) -> TransitionOutcome {
        let mut outcome = TransitionOutcome::default();

        if !event.changed_channel() {
            debug!(member_id = %event.member_id, "Presence update without channel change");
            return outcome;
        }

        if let Some(after) = event.after_channel_id {
            if self.registry.is_trigger(after).await {
                self.spawn_for_member(event, after, &mut outcome).await;
            }
        }

        if let Some(before) = event.before_channel_id {
            if self.registry.is_temporary(before).await {
                match self.release_if_empty(event.guild_id, before).await {
                    Ok(Release::Deleted(entry)) => outcome.deleted = Some(entry),
                    Ok(Release::Occupied | Release::Vanished | Release::AlreadyClaimed) => {}
                    Err(e) => outcome.failures.push(e),
                }
            }
        }

        outcome
    }

    /// Rule 1: create, track, then move the member in.
    async fn spawn_for_member(
        &self,
        event: &PresenceTransition,
        trigger: ChannelId,
        outcome: &mut TransitionOutcome,
    ) {
        let spec = VoiceChannelSpec {
            name: self.policy.channel_name(&event.member_display_name),
            category_id: event.after_parent_id,
            user_limit: self.policy.user_limit,
            bitrate: self.policy.bitrate,
        };

        let channel_id = match self.adapter.create_voice_channel(event.guild_id, &spec).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    trigger_id = %trigger,
                    member_id = %event.member_id,
                    error = %e,
                    "Failed to create temporary channel"
                );
                outcome.failures.push(LifecycleError::adapter(
                    AdapterOp::CreateVoiceChannel,
                    Some(trigger),
                    e,
                ));
                return;
            }
        };

        // Tracked before the move so a member who leaves right away is
        // still seen leaving a temporary channel.
        let entry = match self
            .registry
            .record_temporary(
                channel_id,
                event.member_id,
                event.guild_id,
                event.after_parent_id,
                Utc::now(),
            )
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(channel_id = %channel_id, "Duplicate creation skipped: {e}");
                outcome.failures.push(e.into());
                return;
            }
        };

        info!(
            channel_id = %channel_id,
            name = %spec.name,
            owner_id = %event.member_id,
            guild_id = %event.guild_id,
            "Created temporary channel"
        );
        outcome.created = Some(entry);

        if let Err(e) = self
            .adapter
            .move_member(event.guild_id, event.member_id, channel_id)
            .await
        {
            warn!(
                channel_id = %channel_id,
                member_id = %event.member_id,
                error = %e,
                "Failed to move owner into temporary channel; leaving it active"
            );
            outcome.failures.push(LifecycleError::adapter(
                AdapterOp::MoveMember,
                Some(channel_id),
                e,
            ));
        }
    }

    /// Rule 2: delete a tracked channel if nobody is left in it.
    async fn release_if_empty(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Release, LifecycleError> {
        match self.adapter.list_members(guild_id, channel_id).await {
            Ok(members) if !members.is_empty() => {
                debug!(channel_id = %channel_id, occupants = members.len(), "Temporary channel still occupied");
                return Ok(Release::Occupied);
            }
            Ok(_) => {}
            Err(AdapterError::NotFound(_)) => {
                if self.registry.take_temporary(channel_id).await.is_some() {
                    info!(channel_id = %channel_id, "Temporary channel vanished remotely; forgotten");
                }
                return Ok(Release::Vanished);
            }
            Err(e) => {
                return Err(LifecycleError::adapter(
                    AdapterOp::ListMembers,
                    Some(channel_id),
                    e,
                ));
            }
        }

        let Some(entry) = self.registry.take_temporary(channel_id).await else {
            debug!(channel_id = %channel_id, "Temporary channel already claimed");
            return Ok(Release::AlreadyClaimed);
        };

        match self
            .adapter
            .delete_channel(channel_id, &self.policy.delete_reason)
            .await
        {
            Ok(()) => {
                info!(channel_id = %channel_id, owner_id = %entry.owner_id, "Deleted empty temporary channel");
                Ok(Release::Deleted(entry))
            }
            Err(AdapterError::NotFound(_)) => {
                debug!(channel_id = %channel_id, "Temporary channel was already deleted");
                Ok(Release::Vanished)
            }
            Err(e) => {
                warn!(
                    channel_id = %channel_id,
                    error = %e,
                    "Failed to delete empty temporary channel; it is no longer tracked"
                );
                Err(LifecycleError::adapter(
                    AdapterOp::DeleteChannel,
                    Some(channel_id),
                    e,
                ))
            }
        }
    }

    /// Forget a channel that was deleted on the platform. Returns whether
    /// it was known as a trigger or temporary channel.
    pub async fn on_channel_deleted(&self, channel_id: ChannelId) -> bool {
        let was_trigger = self.registry.remove_trigger(channel_id).await;
        let was_temporary = self.registry.take_temporary(channel_id).await.is_some();
        if was_trigger || was_temporary {
            info!(
                channel_id = %channel_id,
                was_trigger,
                was_temporary,
                "Tracked channel deleted remotely"
            );
        }
        was_trigger || was_temporary
    }

    /// Compare the registry against the platform and repair drift:
    /// prune triggers that no longer exist, forget temporary channels that
    /// vanished, delete temporary channels that sit empty. Channels younger
    /// than the grace period are skipped since their owner may still be
    /// mid-move.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for trigger in self.registry.all_triggers().await {
            match self
                .adapter
                .channel_exists(trigger.guild_id, trigger.channel_id)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    if self.registry.remove_trigger(trigger.channel_id).await {
                        report.pruned_triggers.push(trigger.channel_id);
                    }
                }
                Err(e) => report.failures.push(LifecycleError::adapter(
                    AdapterOp::ChannelExists,
                    Some(trigger.channel_id),
                    e,
                )),
            }
        }

        let now = Utc::now();
        for temp in self.registry.list_temporary().await {
            let old_enough = now
                .signed_duration_since(temp.created_at)
                .to_std()
                .is_ok_and(|age| age >= self.policy.reconcile_grace);
            if !old_enough {
                continue;
            }
            match self.release_if_empty(temp.guild_id, temp.channel_id).await {
                Ok(Release::Deleted(entry)) => report.deleted.push(entry.channel_id),
                Ok(Release::Vanished) => report.forgotten.push(temp.channel_id),
                Ok(Release::Occupied | Release::AlreadyClaimed) => {}
                Err(e) => report.failures.push(e),
            }
        }

        report
    }
}

/// Spawn a background task that runs [`ChannelLifecycleManager::reconcile`]
/// on a fixed interval.
pub fn spawn_reconcile_ticker(
    manager: Arc<ChannelLifecycleManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = manager.reconcile().await;
            if report.is_clean() {
                debug!("Reconciliation sweep found no drift");
                continue;
            }
            info!(
                pruned_triggers = report.pruned_triggers.len(),
                forgotten = report.forgotten.len(),
                deleted = report.deleted.len(),
                failures = report.failures.len(),
                "Reconciliation sweep repaired drift"
            );
            for failure in &report.failures {
                warn!(error = %failure, "Reconciliation step failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::model::MemberId;
    use crate::error::RegistryError;
    use crate::voice::testing::{AdapterCall, FIRST_CREATED_ID, FailureSwitches, FakePlatform};

    const GUILD: GuildId = GuildId::new(1);
    const TRIGGER: ChannelId = ChannelId::new(10);
    const CATEGORY: ChannelId = ChannelId::new(5);
    const ALICE: MemberId = MemberId::new(100);
    const BOB: MemberId = MemberId::new(200);

    async fn setup() -> (Arc<FakePlatform>, ChannelLifecycleManager) {
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(GUILD, TRIGGER);
        let registry = ChannelRegistry::new();
        registry.add_trigger(TRIGGER, GUILD).await;
        let manager = ChannelLifecycleManager::new(
            registry,
            Arc::clone(&platform) as Arc<dyn PlatformAdapter>,
            ChannelPolicy::default(),
        );
        (platform, manager)
    }

    fn join(member: MemberId, name: &str, before: Option<ChannelId>) -> PresenceTransition {
        PresenceTransition {
            member_id: member,
            guild_id: GUILD,
            before_channel_id: before,
            after_channel_id: Some(TRIGGER),
            member_display_name: name.into(),
            after_parent_id: Some(CATEGORY),
        }
    }

    fn leave(member: MemberId, from: ChannelId) -> PresenceTransition {
        PresenceTransition {
            member_id: member,
            guild_id: GUILD,
            before_channel_id: Some(from),
            after_channel_id: None,
            member_display_name: String::new(),
            after_parent_id: None,
        }
    }

    #[tokio::test]
    async fn join_trigger_creates_in_trigger_category_and_moves_member() {
        let (platform, manager) = setup().await;
        platform.connect(ALICE, TRIGGER);

        let outcome = manager.on_presence_transition(&join(ALICE, "Alice", None)).await;
        let created = outcome.created.expect("channel created");
        assert!(outcome.failures.is_empty());
        assert_eq!(created.owner_id, ALICE);
        assert_eq!(created.parent_category_id, Some(CATEGORY));

        match &platform.calls()[0] {
            AdapterCall::Create { spec, .. } => {
                assert_eq!(spec.name, "Alice's Channel");
                assert_eq!(spec.category_id, Some(CATEGORY));
                assert_eq!(spec.user_limit, 0);
                assert_eq!(spec.bitrate, 64_000);
            }
            other => panic!("expected create, got {other:?}"),
        }
        assert!(platform.members_of(created.channel_id).contains(&ALICE));
        assert!(manager.registry().is_temporary(created.channel_id).await);
    }

    #[tokio::test]
    async fn redelivered_join_is_ignored() {
        let (platform, manager) = setup().await;
        let mut event = join(ALICE, "Alice", None);
        event.before_channel_id = Some(TRIGGER);

        let outcome = manager.on_presence_transition(&event).await;
        assert!(outcome.created.is_none());
        assert_eq!(platform.create_calls(), 0);
    }

    #[tokio::test]
    async fn failed_create_records_nothing() {
        let (platform, manager) = setup().await;
        platform.set_failures(FailureSwitches {
            create: true,
            ..Default::default()
        });

        let outcome = manager.on_presence_transition(&join(ALICE, "Alice", None)).await;
        assert!(outcome.created.is_none());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].op(), Some(AdapterOp::CreateVoiceChannel));
        assert_eq!(platform.move_calls(), 0);
        assert!(manager.registry().list_temporary().await.is_empty());
    }

    #[tokio::test]
    async fn failed_move_keeps_channel_active() {
        let (platform, manager) = setup().await;
        platform.set_failures(FailureSwitches {
            move_member: true,
            ..Default::default()
        });

        let outcome = manager.on_presence_transition(&join(ALICE, "Alice", None)).await;
        let created = outcome.created.expect("channel still created");
        assert_eq!(outcome.failures[0].op(), Some(AdapterOp::MoveMember));
        assert!(manager.registry().is_temporary(created.channel_id).await);
        assert!(!platform.members_of(created.channel_id).contains(&ALICE));
    }

    #[tokio::test]
    async fn already_tracked_channel_is_skipped_without_moving() {
        let (platform, manager) = setup().await;
        let next = ChannelId::new(FIRST_CREATED_ID);
        manager
            .registry()
            .record_temporary(next, BOB, GUILD, None, Utc::now())
            .await
            .unwrap();

        let outcome = manager.on_presence_transition(&join(ALICE, "Alice", None)).await;
        assert!(outcome.created.is_none());
        assert!(matches!(
            outcome.failures.as_slice(),
            [LifecycleError::AlreadyTracked(RegistryError::AlreadyTracked(id))] if *id == next
        ));
        assert_eq!(platform.move_calls(), 0);

        let tracked = manager.registry().list_temporary().await;
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].owner_id, BOB);
    }

    #[tokio::test]
    async fn failed_member_listing_keeps_channel_tracked() {
        let (platform, manager) = setup().await;
        platform.connect(ALICE, TRIGGER);
        let created = manager
            .on_presence_transition(&join(ALICE, "Alice", None))
            .await
            .created
            .unwrap();

        platform.disconnect(ALICE);
        platform.set_failures(FailureSwitches {
            list_members: true,
            ..Default::default()
        });
        let outcome = manager
            .on_presence_transition(&leave(ALICE, created.channel_id))
            .await;
        assert!(outcome.deleted.is_none());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].op(), Some(AdapterOp::ListMembers));
        assert!(manager.registry().is_temporary(created.channel_id).await);
        assert!(platform.exists(created.channel_id));
        assert_eq!(platform.delete_calls(), 0);
    }

    #[tokio::test]
    async fn leaving_occupied_channel_keeps_it() {
        let (platform, manager) = setup().await;
        platform.connect(ALICE, TRIGGER);
        let created = manager
            .on_presence_transition(&join(ALICE, "Alice", None))
            .await
            .created
            .unwrap();
        platform.connect(BOB, created.channel_id);

        platform.disconnect(ALICE);
        let outcome = manager
            .on_presence_transition(&leave(ALICE, created.channel_id))
            .await;
        assert!(outcome.deleted.is_none());
        assert_eq!(platform.delete_calls(), 0);
        assert!(manager.registry().is_temporary(created.channel_id).await);
    }

    #[tokio::test]
    async fn failed_delete_still_untracks() {
        let (platform, manager) = setup().await;
        platform.connect(ALICE, TRIGGER);
        let created = manager
            .on_presence_transition(&join(ALICE, "Alice", None))
            .await
            .created
            .unwrap();

        platform.disconnect(ALICE);
        platform.set_failures(FailureSwitches {
            delete: true,
            ..Default::default()
        });
        let outcome = manager
            .on_presence_transition(&leave(ALICE, created.channel_id))
            .await;
        assert_eq!(outcome.failures[0].op(), Some(AdapterOp::DeleteChannel));
        assert!(platform.exists(created.channel_id));
        assert!(manager.registry().list_temporary().await.is_empty());
    }

    #[tokio::test]
    async fn hopping_from_temporary_to_trigger_applies_both_rules() {
        let (platform, manager) = setup().await;
        platform.connect(ALICE, TRIGGER);
        let first = manager
            .on_presence_transition(&join(ALICE, "Alice", None))
            .await
            .created
            .unwrap();

        platform.connect(ALICE, TRIGGER);
        let outcome = manager
            .on_presence_transition(&join(ALICE, "Alice", Some(first.channel_id)))
            .await;

        let second = outcome.created.expect("new channel");
        assert_ne!(second.channel_id, first.channel_id);
        assert_eq!(outcome.deleted.map(|c| c.channel_id), Some(first.channel_id));
        let tracked: Vec<ChannelId> = manager
            .registry()
            .list_temporary()
            .await
            .into_iter()
            .map(|c| c.channel_id)
            .collect();
        assert_eq!(tracked, vec![second.channel_id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_empty_observations_delete_once() {
        let (platform, manager) = setup().await;
        platform.connect(ALICE, TRIGGER);
        let created = manager
            .on_presence_transition(&join(ALICE, "Alice", None))
            .await
            .created
            .unwrap();
        platform.connect(BOB, created.channel_id);

        platform.disconnect(ALICE);
        platform.disconnect(BOB);
        let channel_id = created.channel_id;
        let manager = Arc::new(manager);
        let a = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.on_presence_transition(&leave(ALICE, channel_id)).await }
        });
        let b = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.on_presence_transition(&leave(BOB, channel_id)).await }
        });
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.deleted.is_some()).count(), 1);
        assert_eq!(platform.delete_calls(), 1);
    }

    #[tokio::test]
    async fn channel_deleted_remotely_is_forgotten() {
        let (_platform, manager) = setup().await;
        assert!(manager.on_channel_deleted(TRIGGER).await);
        assert!(!manager.registry().is_trigger(TRIGGER).await);
        assert!(!manager.on_channel_deleted(TRIGGER).await);
    }

    #[tokio::test]
    async fn reconcile_repairs_drift() {
        let platform = Arc::new(FakePlatform::new());
        let registry = ChannelRegistry::new();
        let policy = ChannelPolicy {
            reconcile_grace: Duration::ZERO,
            ..ChannelPolicy::default()
        };
        let manager = ChannelLifecycleManager::new(
            Arc::clone(&registry),
            Arc::clone(&platform) as Arc<dyn PlatformAdapter>,
            policy,
        );

        // Stale trigger: configured but gone from the platform.
        registry.add_trigger(TRIGGER, GUILD).await;

        let empty = ChannelId::new(50);
        let vanished = ChannelId::new(51);
        let busy = ChannelId::new(52);
        platform.add_channel(GUILD, empty);
        platform.add_channel(GUILD, busy);
        platform.connect(BOB, busy);
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        for id in [empty, vanished, busy] {
            registry
                .record_temporary(id, ALICE, GUILD, None, earlier)
                .await
                .unwrap();
        }

        let report = manager.reconcile().await;
        assert_eq!(report.pruned_triggers, vec![TRIGGER]);
        assert_eq!(report.forgotten, vec![vanished]);
        assert_eq!(report.deleted, vec![empty]);
        assert!(report.failures.is_empty());
        assert!(!platform.exists(empty));

        let tracked: Vec<ChannelId> = registry
            .list_temporary()
            .await
            .into_iter()
            .map(|c| c.channel_id)
            .collect();
        assert_eq!(tracked, vec![busy]);
        assert!(manager.reconcile().await.is_clean());
    }

    #[tokio::test]
    async fn reconcile_skips_channels_inside_grace_period() {
        let (platform, manager) = setup().await;
        platform.set_failures(FailureSwitches {
            move_member: true,
            ..Default::default()
        });
        let created = manager
            .on_presence_transition(&join(ALICE, "Alice", None))
            .await
            .created
            .unwrap();

        let report = manager.reconcile().await;
        assert!(report.is_clean());
        assert!(platform.exists(created.channel_id));
        assert!(manager.registry().is_temporary(created.channel_id).await);
    }
}
