use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pnbot::chat::{ChatPlatform, DiscordRest, EventBus, Gateway};
use pnbot::commands::CommandHandler;
use pnbot::config::{BotConfig, GuildSettings};
use pnbot::interview::{InterviewDeps, InterviewRegistry, Timing};
use pnbot::router::Router;
use pnbot::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env()?;

    // Initialize tracing; the file writer guard must live until exit.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pnbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("🪪 PNBot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Prefix: {}", config.prefix);
    eprintln!("   Settings: {}", config.guild_settings_path.display());

    // ── Settings ─────────────────────────────────────────────────────────
    let settings = GuildSettings::load(&config.guild_settings_path).with_context(|| {
        format!(
            "Failed to load guild settings from {}",
            config.guild_settings_path.display()
        )
    })?;

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Discord ──────────────────────────────────────────────────────────
    let (gateway, events) = Gateway::connect(&config.token)
        .await
        .context("Failed to set up the Discord gateway client")?;
    let rest = DiscordRest::connect(gateway.http())
        .await
        .context("Failed to log in to Discord")?;
    eprintln!("   Logged in as bot user {}", rest.bot_user_id());
    let platform: Arc<dyn ChatPlatform> = Arc::new(rest);

    // ── Interviews ───────────────────────────────────────────────────────
    let deps = InterviewDeps {
        platform,
        db,
        bus: EventBus::new(),
        settings: Arc::new(RwLock::new(settings)),
        prefix: config.prefix.clone(),
        timing: Timing::default(),
    };
    let registry = Arc::new(InterviewRegistry::new(deps));
    if let Err(e) = registry.init_archive_and_log_channel().await {
        tracing::error!(error = %e, "Archive channel unavailable; interviews cannot be archived");
    }
    let loaded = registry.load().await?;
    eprintln!("   Resumed {loaded} open interviews\n");

    let shard = gateway.start();
    let handler = CommandHandler::new(Arc::clone(&registry), config.guild_settings_path.clone());
    Router::new(handler)
        .run(events, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    shard.abort();
    Ok(())
}
