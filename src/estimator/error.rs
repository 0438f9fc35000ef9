//! Error types for calorie estimation
//!
//! Errors are categorized so the caller can tell a transport problem from a
//! model that answered with something unusable. The conversation handler
//! reports all of them to the user the same way and never retries.

use thiserror::Error;

/// Errors that can occur when asking the vision model for an estimate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    /// Network-related errors (connection issues, DNS failures)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Authentication errors (invalid or missing API key)
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Rate limit or quota errors
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    /// Request took longer than the configured timeout
    #[error("Request timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Error reported by the model API itself
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        code: Option<String>,
    },

    /// The model answered with text that is not the expected JSON
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The model answered with JSON that breaks the estimate contract
    #[error("Invalid estimate: {message}")]
    Validation { message: String },

    /// Missing or invalid estimator configuration
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl EstimateError {
    /// Returns true for errors caused by the transport rather than the model
    /// output. Nothing retries on this today; it only drives log levels.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EstimateError::Network { .. }
                | EstimateError::RateLimit { .. }
                | EstimateError::Timeout { .. }
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    pub fn provider(message: impl Into<String>, code: Option<impl Into<String>>) -> Self {
        Self::Provider {
            message: message.into(),
            code: code.map(|c| c.into()),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EstimateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
