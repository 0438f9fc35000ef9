//! Identity of API callers
//!
//! The web client runs inside Telegram and forwards the WebApp `initData`
//! string in the `X-Telegram-Init-Data` header. Only the `user` field is
//! read; the signature hash is not verified, so the header must be treated
//! as a claim rather than proof of identity.

use axum::{extract::Request, middleware::Next, response::Response};
use serde::Deserialize;
use thiserror::Error;

use crate::api::ApiError;

pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("X-Telegram-Init-Data header missing")]
    MissingHeader,

    #[error("initData is empty")]
    Empty,

    #[error("user data not found in initData")]
    MissingUser,

    #[error("failed to parse user JSON: {0}")]
    InvalidUser(String),

    #[error("user ID is zero or missing in parsed JSON")]
    MissingUserId,
}

/// User object embedded in Telegram WebApp init data
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelegramUser {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
}

/// Caller identity attached to authenticated requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Extracts the user from a URL-encoded init data query string.
pub fn parse_init_data(init_data: &str) -> Result<TelegramUser, AuthError> {
    if init_data.trim().is_empty() {
        return Err(AuthError::Empty);
    }

    let user_json = url::form_urlencoded::parse(init_data.as_bytes())
        .find(|(key, _)| key == "user")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingUser)?;

    let user: TelegramUser =
        serde_json::from_str(&user_json).map_err(|e| AuthError::InvalidUser(e.to_string()))?;

    if user.id == 0 {
        return Err(AuthError::MissingUserId);
    }
    Ok(user)
}

/// Rejects requests without usable init data and attaches [`AuthUser`]
/// to the rest.
pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let init_data = request
        .headers()
        .get(INIT_DATA_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(method = %request.method(), path = %request.uri().path(), "Init data header missing");
            ApiError::from(AuthError::MissingHeader)
        })?;

    let user = parse_init_data(init_data).map_err(|e| {
        tracing::debug!(error = %e, "Failed to parse init data");
        ApiError::from(e)
    })?;

    tracing::debug!(user_id = user.id, username = %user.username, "User authenticated");
    request
        .extensions_mut()
        .insert(AuthUser { user_id: user.id });
    Ok(next.run(request).await)
}
