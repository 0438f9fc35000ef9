//! Route definitions for the food log API.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware,
    routing::{get, patch},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::ApiError;
use crate::api::auth::{AuthUser, INIT_DATA_HEADER, auth_middleware};
use crate::logs::{LogEntry, LogStore, LogUpdate, NewLog};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LogStore>,
}

/// Builds the HTTP router: `/health` plus the authenticated `/api/logs`
/// routes, with CORS restricted to `allowed_origins`.
pub fn build_router(store: Arc<dyn LogStore>, allowed_origins: &[String]) -> Router {
    let state = AppState { store };

    let api = Router::new()
        .route("/logs", get(list_logs).post(create_log))
        .route("/logs/:id", patch(update_log).delete(delete_log))
        .route_layer(middleware::from_fn(auth_middleware))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(INIT_DATA_HEADER)])
        .allow_credentials(true)
}

async fn health() -> &'static str {
    "OK"
}

fn parse_log_id(id: &str) -> Result<Uuid, ApiError> {
    // An id that is not a UUID cannot name an existing entry
    id.parse()
        .map_err(|_| ApiError::NotFound(format!("log not found: {}", id)))
}

async fn list_logs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let logs = state.store.list_logs(user.user_id).await?;
    Ok(Json(logs))
}

async fn create_log(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<NewLog>, JsonRejection>,
) -> Result<(StatusCode, Json<LogEntry>), ApiError> {
    let Json(new_log) = body?;
    let entry = state.store.create_log(user.user_id, new_log).await?;
    tracing::info!(user_id = user.user_id, log_id = %entry.id, "Log entry created via API");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update_log(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Result<Json<LogUpdate>, JsonRejection>,
) -> Result<Json<LogEntry>, ApiError> {
    let id = parse_log_id(&id)?;
    let Json(update) = body?;
    let entry = state.store.update_log(user.user_id, id, update).await?;
    Ok(Json(entry))
}

async fn delete_log(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_log_id(&id)?;
    state.store.delete_log(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
