use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::channels::{
    Channel, CliChannel, TelegramApi, TelegramChannel, TelegramWebhookChannel,
};
use chat_relay::config::{RelayConfig, TransportMode};
use chat_relay::intake::IntakeMachine;
use chat_relay::llm::{TextCompleter, create_provider};
use chat_relay::relay::Relay;
use chat_relay::sessions::InMemorySessionDirectory;
use chat_relay::store::{ConversationStore, LibSqlBackend};
use chat_relay::web::web_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export BOT_TOKEN=... GEMINI_API_KEY=...");
        std::process::exit(1);
    });

    // Held for the life of the process so buffered file logs get flushed.
    let _log_guard = init_tracing(&config);

    eprintln!("🤖 Chat relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.llm.model, config.llm.backend.as_str());
    eprintln!("   Transport: {:?}", config.transport);
    eprintln!("   HTTP: http://0.0.0.0:{}/", config.port);

    // ── Completion backend ──────────────────────────────────────────────
    let llm = create_provider(&config.llm).context("Failed to create LLM provider")?;
    let completer = TextCompleter::new(llm, config.llm_timeout);

    // ── Database ────────────────────────────────────────────────────────
    let store: Arc<dyn ConversationStore> = Arc::new(
        LibSqlBackend::open(&config.database)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database: {e}");
                std::process::exit(1);
            }),
    );

    let intake = Arc::new(IntakeMachine::new(
        Arc::new(InMemorySessionDirectory::new()),
        completer,
        Arc::clone(&store),
    ));

    // ── Channel ─────────────────────────────────────────────────────────
    let bot_token = config
        .bot_token
        .as_ref()
        .map(|t| t.expose_secret().to_string());

    let (channel, webhook_router): (Arc<dyn Channel>, _) = match config.transport {
        TransportMode::Cli => {
            eprintln!("   Type a message and press Enter.\n");
            (Arc::new(CliChannel::new()), None)
        }
        TransportMode::Polling => {
            let token = bot_token.context("BOT_TOKEN is required for polling")?;
            (Arc::new(TelegramChannel::new(TelegramApi::new(token))), None)
        }
        TransportMode::Webhook => {
            let token = bot_token.context("BOT_TOKEN is required for webhooks")?;
            let host = config
                .external_hostname
                .as_deref()
                .context("EXTERNAL_HOSTNAME is required for webhooks")?;
            let webhook = TelegramWebhookChannel::new(TelegramApi::new(token), host);
            let router = webhook.router();
            (Arc::new(webhook), Some(router))
        }
    };

    if let Err(e) = channel.health_check().await {
        tracing::warn!(channel = channel.name(), error = %e, "Channel health check failed");
    }

    // ── Web server ──────────────────────────────────────────────────────
    let app = web_routes(Arc::clone(&store), webhook_router)?;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Web server started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Web server stopped");
        }
    });

    // ── Relay ───────────────────────────────────────────────────────────
    Relay::new(channel, intake).run().await?;

    Ok(())
}

/// stderr logging always; a daily rolling file too when `RELAY_LOG_DIR` is
/// set.
fn init_tracing(config: &RelayConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "chat-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}
