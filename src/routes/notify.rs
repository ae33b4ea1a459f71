//! # routes::notify
//!
//! The notification dispatcher as a service surface — any internal producer
//! can tell "user X about event Y" without knowing which providers exist.
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | POST   | `/api/notify`          | Fan one event out to a user's devices|
//! | POST   | `/api/notify/register` | Register / re-activate a device token|
//! | GET    | `/api/notify/log`      | Recent delivery audit rows           |

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db;
use crate::error::AppError;
use crate::models::NotifyRequest;
use crate::state::SharedState;

// ─── POST /api/notify ─────────────────────────────────────────────────────────

/// Direct dispatch: `{user_id, type, title, body, data}` →
/// `{success, sent, failed, results}`.
pub async fn send_notification(
    State(state): State<SharedState>,
    Json(request): Json<NotifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.user_id.is_empty() {
        return Err(AppError::BadRequest("user_id must not be empty".into()));
    }
    if request.title.is_empty() && request.body.is_empty() {
        return Err(AppError::BadRequest("title or body is required".into()));
    }

    let report = state.orchestrator.notify_user(&state.db, &request).await?;
    Ok(Json(report))
}

// ─── POST /api/notify/register ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub token:   String,
    /// Optional platform hint from the app (`ios` / `android`).
    pub platform: Option<String>,
}

/// Register a device token. The platform is classified **once here** and
/// persisted, so the send path never has to guess from token shape again.
pub async fn register_endpoint(
    State(state): State<SharedState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.user_id.is_empty() || request.token.is_empty() {
        return Err(AppError::BadRequest("user_id and token are required".into()));
    }

    let platform = db::register_endpoint(
        &state.db,
        &request.user_id,
        &request.token,
        request.platform.as_deref(),
    )
    .await?;

    info!(
        user_id  = %request.user_id,
        platform = platform.as_str(),
        "📱 Endpoint registered"
    );

    Ok(Json(json!({
        "ok":       true,
        "platform": platform,
    })))
}

// ─── GET /api/notify/log ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub user_id: String,
    #[serde(default = "default_limit")]
    pub limit:   i64,
}

fn default_limit() -> i64 {
    50
}

/// Recent delivery attempts for one user — tokens appear truncated only.
pub async fn get_delivery_log(
    State(state): State<SharedState>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let rows = db::recent_deliveries(&state.db, &query.user_id, query.limit).await?;

    Ok(Json(json!({
        "ok":      true,
        "count":   rows.len(),
        "records": rows,
    })))
}
