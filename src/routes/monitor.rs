//! # routes::monitor
//!
//! **Monitor trigger** — the external scheduler POSTs here once per tick.
//!
//! | Method | Path                  | Description                            |
//! |--------|-----------------------|----------------------------------------|
//! | POST   | `/api/monitor/tick`   | Run one evaluation pass                |
//! | GET    | `/api/monitor/health` | Liveness + counters (unauthenticated)  |

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::atomic::Ordering;

use crate::engine::monitor::run_tick;
use crate::error::AppError;
use crate::state::SharedState;

// ─── POST /api/monitor/tick ───────────────────────────────────────────────────

/// Run one monitor pass and report what it did. Overlapping triggers are
/// safe — the store's conditional update is the only guard needed.
pub async fn handle_tick(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let summary = run_tick(&state).await?;

    Ok(Json(json!({
        "ok":      true,
        "summary": summary,
    })))
}

// ─── GET /api/monitor/health ──────────────────────────────────────────────────

pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let tick_count  = state.tick_count.load(Ordering::Relaxed);
    let close_count = state.close_count.load(Ordering::Relaxed);

    Json(json!({
        "ok":          true,
        "tick_count":  tick_count,
        "close_count": close_count,
        "fcm":         state.config.fcm.is_some(),
        "apns":        state.config.apns.is_some(),
    }))
}
