use secrecy::ExposeSecret;
use serenity::Client;
use tokio::net::TcpListener;

use tempvoice::config::BotConfig;
use tempvoice::discord::DiscordHandler;
use tempvoice::status::{StatusBoard, StatusState, status_routes};
use tempvoice::voice::ChannelRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env()?;

    eprintln!("🔊 tempvoice v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Status API: http://0.0.0.0:{}/api/bot/status", config.status_port);
    eprintln!("   Channel name: {}", config.policy.name_template);
    match config.reconcile_interval {
        Some(interval) => eprintln!("   Sweep: every {}s", interval.as_secs()),
        None => eprintln!("   Sweep: disabled"),
    }

    let registry = ChannelRegistry::new();
    let board = StatusBoard::new();

    // ── Status server ───────────────────────────────────────────────────
    let app = status_routes(
        StatusState {
            registry: registry.clone(),
            board: board.clone(),
        },
        &config.cors_origins,
    );
    let listener = TcpListener::bind(("0.0.0.0", config.status_port)).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Status server stopped");
        }
    });
    tracing::info!(port = config.status_port, "Status server started");

    // ── Gateway ─────────────────────────────────────────────────────────
    let handler = DiscordHandler::new(
        registry,
        config.policy.clone(),
        config.reconcile_interval,
        board,
    );
    let mut client = Client::builder(config.token.expose_secret(), DiscordHandler::intents())
        .event_handler(handler)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await?;
    Ok(())
}
