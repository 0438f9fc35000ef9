use crate::config::schema::Config;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
pub(crate) static CONFIG_TEST_ENV_LOCK: Mutex<()> = Mutex::new(());

const CONFIG_DIR_NAME: &str = ".calorie-bot";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid port value: {0}")]
    InvalidPort(String),

    #[error("Telegram bot token is not set. Set TELEGRAM_BOT_TOKEN or telegram_token in the config file.")]
    MissingTelegramToken,

    #[error("Telegram bot token is malformed. Check @BotFather (https://t.me/BotFather) for a valid token.")]
    InvalidTelegramToken,

    #[error("Gemini API key is not set. Set GEMINI_API_KEY or gemini_api_key in the config file.")]
    MissingGeminiKey,
}

/// Loads configuration: defaults, then the config file, then environment
/// variables, then CLI flags.
pub fn load_config(
    cli_port: Option<u16>,
    cli_model: Option<String>,
    cli_config_path: Option<PathBuf>,
) -> Result<Config> {
    tracing::debug!("Loading configuration");

    let mut config = Config::default();

    // Layer 1: Load from config file (~/.calorie-bot/config.json)
    let config_file = cli_config_path.or_else(get_default_config_path);

    if let Some(ref path) = config_file {
        if path.exists() {
            tracing::debug!(config_path = %path.display(), "Loading configuration from file");
            config = merge_config_from_file(config, path)?;
        } else {
            tracing::debug!(config_path = %path.display(), "Config file not found, using defaults");
        }
    }

    // Layer 2: Environment variables override
    tracing::debug!("Applying environment variable overrides");
    config = merge_env_variables(config)?;

    // Layer 3: CLI flags override (highest precedence)
    if let Some(port) = cli_port {
        tracing::debug!(port, "Applying CLI port override");
        config.port = port;
    }
    if let Some(model) = cli_model {
        tracing::debug!(model = %model, "Applying CLI model override");
        config.gemini_model = model;
    }

    let summary = config.get_safe_summary();
    tracing::debug!(
        telegram_configured = summary.telegram_configured,
        gemini_configured = summary.gemini_configured,
        model = %summary.model,
        port = summary.port,
        allowed_origin_count = summary.allowed_origin_count,
        "Configuration loaded successfully"
    );

    Ok(config)
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join("config.json"))
}

fn merge_config_from_file(config: Config, path: &Path) -> Result<Config> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
        Err(e) => return Err(e).context("Failed to read metadata for config file"),
    };

    let mode = metadata.permissions().mode() & 0o777;

    if mode != 0o600 {
        tracing::error!(
            "Config file {:?} has permissions {:o}, expected 0600 - skipping for security",
            path,
            mode
        );
        return Ok(config);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    // Missing fields fall back to defaults
    let file_config: Config = serde_json::from_str(&content).map_err(ConfigError::InvalidJson)?;

    Ok(Config {
        telegram_token: file_config.telegram_token.or(config.telegram_token),
        gemini_api_key: file_config.gemini_api_key.or(config.gemini_api_key),
        ..file_config
    })
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn merge_env_variables(mut config: Config) -> Result<Config, ConfigError> {
    if let Some(token) = env_non_empty("TELEGRAM_BOT_TOKEN") {
        config.telegram_token = Some(token);
    }
    if let Some(key) = env_non_empty("GEMINI_API_KEY") {
        config.gemini_api_key = Some(key);
    }
    if let Some(model) = env_non_empty("GEMINI_MODEL") {
        config.gemini_model = model;
    }
    if let Some(port) = env_non_empty("PORT") {
        config.port = port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
    }

    // Public URLs of the web client, e.g. a tunnel during development
    for name in ["TUNNEL_URL", "MINIAPP_URL"] {
        if let Some(url) = env_non_empty(name) {
            config.add_allowed_origin(&url);
        }
    }

    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let json = serde_json::to_string_pretty(config)?;

    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create config file: {:?}", path))?;

    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    // Set file permissions to 0600 (owner read/write only)
    let mut permissions = file.metadata()?.permissions();
    permissions.set_mode(0o600);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to set permissions on config file: {:?}", path))?;

    tracing::info!("Configuration saved to {:?}", path);
    Ok(())
}

pub fn get_config_path() -> Option<PathBuf> {
    get_default_config_path()
}
