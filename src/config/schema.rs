use serde::{Deserialize, Serialize};

use crate::channels::telegram::is_valid_token_format;
use crate::config::loader::ConfigError;
use crate::estimator::gemini::DEFAULT_GEMINI_MODEL;

pub const DEFAULT_PORT: u16 = 8080;

/// Origins allowed to call the HTTP API when nothing else is configured
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = [
    "http://localhost:5173",
    "https://telegram-calories-bot.pages.dev",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    pub gemini_model: String,

    /// Port of the HTTP API
    pub port: u16,

    /// CORS origins of the web client
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: None,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            port: DEFAULT_PORT,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Config overview that is safe to log
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSummary {
    pub telegram_configured: bool,
    pub gemini_configured: bool,
    pub model: String,
    pub port: u16,
    pub allowed_origin_count: usize,
}

impl Config {
    pub fn get_safe_summary(&self) -> ConfigSummary {
        ConfigSummary {
            telegram_configured: self.telegram_token.is_some(),
            gemini_configured: self.gemini_api_key.is_some(),
            model: self.gemini_model.clone(),
            port: self.port,
            allowed_origin_count: self.allowed_origins.len(),
        }
    }

    /// Adds `origin` to the CORS list unless it is already there.
    pub fn add_allowed_origin(&mut self, origin: &str) {
        let origin = origin.trim().trim_end_matches('/');
        if origin.is_empty() || self.allowed_origins.iter().any(|o| o == origin) {
            return;
        }
        self.allowed_origins.push(origin.to_string());
    }

    /// Checks everything the Telegram bot needs: a well-formed bot token and
    /// a Gemini API key.
    pub fn validate_for_bot(&self) -> Result<(), ConfigError> {
        match self.telegram_token.as_deref() {
            None | Some("") => return Err(ConfigError::MissingTelegramToken),
            Some(token) if !is_valid_token_format(token) => {
                return Err(ConfigError::InvalidTelegramToken);
            }
            Some(_) => {}
        }

        match self.gemini_api_key.as_deref().map(str::trim) {
            None | Some("") => Err(ConfigError::MissingGeminiKey),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot_config() -> Config {
        Config {
            telegram_token: Some("123456:secret".to_string()),
            gemini_api_key: Some("gemini-key".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.telegram_token.is_none());
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.port, 8080);
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn test_config_serialization_skips_missing_secrets() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(!json.contains("telegram_token"));
        assert!(!json.contains("gemini_api_key"));
        assert!(json.contains("gemini-2.5-flash"));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let json = r#"{
            "telegram_token": "123:abc",
            "port": 9000
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.telegram_token, Some("123:abc".to_string()));
        assert_eq!(config.port, 9000);
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.allowed_origins, Config::default().allowed_origins);
    }

    #[test]
    fn test_add_allowed_origin() {
        let mut config = Config::default();
        config.add_allowed_origin("https://abc.trycloudflare.com/");
        config.add_allowed_origin("https://abc.trycloudflare.com");
        config.add_allowed_origin("  ");

        assert_eq!(config.allowed_origins.len(), 3);
        assert_eq!(config.allowed_origins[2], "https://abc.trycloudflare.com");
    }

    #[test]
    fn test_safe_summary() {
        let summary = bot_config().get_safe_summary();
        assert!(summary.telegram_configured);
        assert!(summary.gemini_configured);
        assert_eq!(summary.port, 8080);
        assert_eq!(summary.allowed_origin_count, 2);
    }

    #[test]
    fn test_validate_for_bot() {
        assert!(bot_config().validate_for_bot().is_ok());

        let mut config = bot_config();
        config.telegram_token = None;
        assert!(matches!(
            config.validate_for_bot(),
            Err(ConfigError::MissingTelegramToken)
        ));

        let mut config = bot_config();
        config.telegram_token = Some("not-a-token".to_string());
        assert!(matches!(
            config.validate_for_bot(),
            Err(ConfigError::InvalidTelegramToken)
        ));

        let mut config = bot_config();
        config.gemini_api_key = Some(" ".to_string());
        assert!(matches!(
            config.validate_for_bot(),
            Err(ConfigError::MissingGeminiKey)
        ));
    }
}
