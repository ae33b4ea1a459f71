//! # auth — API Key Middleware
//!
//! Protects every endpoint with an `X-API-Key` header — the tick trigger and
//! the notification dispatcher must not be callable by strangers.
//!
//! ## Mode
//! - `API_KEY` unset (or empty) → **Allow All** (dev mode)
//! - `API_KEY` set → every request needs `X-API-Key: <key>`
//!
//! ## Exempt
//! Health check (`/api/monitor/health`) stays open for uptime probes.

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

/// Axum middleware — validates the X-API-Key header.
pub async fn require_api_key(request: Request<Body>, next: Next) -> Response {
    let api_key_env = std::env::var("API_KEY").unwrap_or_default();

    // ── Dev mode: no API_KEY configured → pass everything through ────────────
    if api_key_env.is_empty() {
        return next.run(request).await;
    }

    // ── Health check exemption ────────────────────────────────────────────────
    let path = request.uri().path();
    if path == "/api/monitor/health" || path == "/health" {
        return next.run(request).await;
    }

    // ── Header check ──────────────────────────────────────────────────────────
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == api_key_env {
        next.run(request).await
    } else {
        warn!(path, "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
