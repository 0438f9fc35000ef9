//! Long-running service
//!
//! Wires the Telegram bot and the HTTP API together, runs until SIGINT or
//! SIGTERM and then stops everything in order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::build_router;
use crate::channels::TelegramChannel;
use crate::config::{Config, ConfigError};
use crate::conversation::EstimateHandler;
use crate::estimator::{GeminiConfig, GeminiEstimator};
use crate::logs::{LogStore, MemoryLogStore};
use crate::session::{CleanupTask, SessionManager};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Which parts of the service to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Bot and HTTP API sharing one log store
    All,
    /// Telegram bot only; estimates are not recorded
    Bot,
    /// HTTP API only
    Api,
}

impl GatewayMode {
    pub fn runs_bot(&self) -> bool {
        matches!(self, GatewayMode::All | GatewayMode::Bot)
    }

    pub fn runs_api(&self) -> bool {
        matches!(self, GatewayMode::All | GatewayMode::Api)
    }
}

struct BotService {
    channel: TelegramChannel,
    expiry: CleanupTask,
}

/// Runs the service until a shutdown signal arrives.
pub async fn run_gateway(config: &Config, mode: GatewayMode) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?mode,
        "Starting calorie-bot"
    );

    if mode.runs_bot() {
        config
            .validate_for_bot()
            .context("Invalid configuration for the Telegram bot")?;
    }

    // The bot-only deployment has nobody to read the log, so nothing is stored
    let log_store: Option<Arc<dyn LogStore>> = if mode.runs_api() {
        Some(Arc::new(MemoryLogStore::new()))
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bot = if mode.runs_bot() {
        Some(start_bot(config, log_store.clone()).await?)
    } else {
        None
    };

    let server = match &log_store {
        Some(store) => Some(start_api(config, Arc::clone(store), shutdown_rx).await?),
        None => None,
    };

    info!("calorie-bot is running. Press Ctrl+C to stop.");
    wait_for_shutdown_signal().await;

    // Graceful shutdown sequence
    info!("Starting graceful shutdown sequence...");
    let _ = shutdown_tx.send(true);

    if let Some(bot) = bot {
        info!("Shutting down Telegram channel...");
        bot.channel.shutdown().await;

        info!("Stopping session expiry task...");
        if bot.expiry.is_finished() {
            warn!("Session expiry task had already stopped before shutdown");
        }
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, bot.expiry.stop())
            .await
            .is_err()
        {
            error!("Session expiry task did not stop within 5s timeout");
        }
    }

    if let Some(server) = server {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
            Ok(Ok(Ok(()))) => info!("HTTP server stopped gracefully"),
            Ok(Ok(Err(e))) => error!("HTTP server error: {}", e),
            Ok(Err(e)) => error!("HTTP server task panicked: {}", e),
            Err(_) => error!("HTTP server did not stop within 5s timeout"),
        }
    }

    info!("calorie-bot stopped gracefully");
    Ok(())
}

async fn start_bot(config: &Config, log_store: Option<Arc<dyn LogStore>>) -> Result<BotService> {
    let token = config
        .telegram_token
        .as_deref()
        .ok_or(ConfigError::MissingTelegramToken)?;
    let api_key = config
        .gemini_api_key
        .clone()
        .ok_or(ConfigError::MissingGeminiKey)?;

    let estimator = GeminiEstimator::new(
        GeminiConfig::new(api_key).with_model(config.gemini_model.clone()),
    )
    .context("Failed to create Gemini estimator")?;
    info!(model = %estimator.model(), "Using Gemini estimator");

    let channel = TelegramChannel::new(token)?;
    let username = channel
        .verify()
        .await
        .context("Failed to connect to Telegram. Check the bot token")?;
    info!(bot = %username, "Connected to Telegram");

    let sessions = SessionManager::new();
    let expiry = sessions.start_expiry();

    let mut handler = EstimateHandler::new(
        sessions,
        Arc::new(channel.sender()),
        Arc::new(estimator),
    );
    if let Some(store) = log_store {
        handler = handler.with_log_store(store);
    }

    channel
        .start(Arc::new(handler))
        .await
        .context("Failed to start Telegram channel")?;

    Ok(BotService { channel, expiry })
}

async fn start_api(
    config: &Config,
    store: Arc<dyn LogStore>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<JoinHandle<std::io::Result<()>>> {
    let router = build_router(store, &config.allowed_origins);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
    info!(
        addr = %addr,
        origins = ?config.allowed_origins,
        "HTTP API listening"
    );

    Ok(tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await
    }))
}

/// Resolves on the first SIGTERM or SIGINT (Ctrl+C elsewhere).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Failed to set up signal handlers: {}. Falling back to Ctrl+C", e);
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown..."),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    }
}
