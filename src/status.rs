//! Read-only status endpoints for the dashboard.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::voice::{ChannelRegistry, GuildId, TemporaryChannel, TriggerChannel};

/// Gateway identity, known once the bot is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotIdentity {
    pub username: String,
    pub avatar: Option<String>,
}

/// A guild the bot is a member of. `member_count` is as of the last
/// `guild_create` for that guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildSummary {
    pub id: GuildId,
    pub name: String,
    pub member_count: u64,
    pub icon: Option<String>,
}

#[derive(Debug, Default)]
struct BoardState {
    identity: Option<BotIdentity>,
    guilds: BTreeMap<GuildId, GuildSummary>,
}

/// Connection state shared between the gateway handler and the status routes.
#[derive(Debug, Default)]
pub struct StatusBoard {
    state: RwLock<BoardState>,
}

impl StatusBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn mark_ready(&self, username: impl Into<String>, avatar: Option<String>) {
        self.state.write().await.identity = Some(BotIdentity {
            username: username.into(),
            avatar,
        });
    }

    pub async fn identity(&self) -> Option<BotIdentity> {
        self.state.read().await.identity.clone()
    }

    /// Record a guild the bot joined or became available in. Replaces any
    /// earlier summary for the same guild.
    pub async fn upsert_guild(&self, guild: GuildSummary) {
        self.state.write().await.guilds.insert(guild.id, guild);
    }

    pub async fn remove_guild(&self, guild_id: GuildId) -> bool {
        self.state.write().await.guilds.remove(&guild_id).is_some()
    }

    /// Guilds ordered by id.
    pub async fn guilds(&self) -> Vec<GuildSummary> {
        self.state.read().await.guilds.values().cloned().collect()
    }
}

#[derive(Debug, Serialize)]
pub struct BotStatus {
    /// `online` or `offline`.
    pub status: &'static str,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub guilds_count: usize,
    pub user_count: u64,
    pub temp_channels_count: usize,
    pub join_to_create_count: usize,
}

/// Shared state for status handlers.
#[derive(Clone)]
pub struct StatusState {
    pub registry: Arc<ChannelRegistry>,
    pub board: Arc<StatusBoard>,
}

/// Build the status router. `cors_origins` containing `*` allows any origin.
pub fn status_routes(state: StatusState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/bot/status", get(bot_status))
        .route("/api/bot/guilds", get(bot_guilds))
        .route("/api/channels/temporary", get(temporary_channels))
        .route("/api/guilds/{guild_id}/triggers", get(guild_triggers))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tempvoice"
    }))
}

async fn bot_status(State(state): State<StatusState>) -> Json<BotStatus> {
    let (identity, guilds) = {
        let board = state.board.state.read().await;
        (board.identity.clone(), board.guilds.values().map(|g| g.member_count).collect::<Vec<_>>())
    };
    Json(BotStatus {
        status: if identity.is_some() { "online" } else { "offline" },
        username: identity.as_ref().map(|i| i.username.clone()),
        avatar: identity.and_then(|i| i.avatar),
        guilds_count: guilds.len(),
        user_count: guilds.iter().sum(),
        temp_channels_count: state.registry.temporary_count().await,
        join_to_create_count: state.registry.trigger_count().await,
    })
}

async fn bot_guilds(State(state): State<StatusState>) -> Json<Vec<GuildSummary>> {
    Json(state.board.guilds().await)
}

async fn temporary_channels(State(state): State<StatusState>) -> Json<Vec<TemporaryChannel>> {
    Json(state.registry.list_temporary().await)
}

async fn guild_triggers(
    State(state): State<StatusState>,
    Path(guild_id): Path<u64>,
) -> Json<Vec<TriggerChannel>> {
    Json(state.registry.list_triggers(GuildId::new(guild_id)).await)
}
