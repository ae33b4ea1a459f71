//! # Watchtower — Paper-Trading Risk Monitor & Push Pipeline
//!
//! ```text
//!  ┌─────────────┐  POST /api/monitor/tick   ┌──────────────────────────────┐
//!  │  Scheduler  │ ────────────────────────▶ │ MonitorCron                  │
//!  │  (cron)     │                           │ ├─ PriceFeed (exchange API)  │
//!  └─────────────┘                           │ ├─ PositionEvaluator (pure)  │
//!                                            │ ├─ PositionStore (CAS close) │
//!  ┌─────────────┐  POST /api/notify         │ └─ DeliveryOrchestrator ───┐ │
//!  │  Producers  │ ────────────────────────▶ │                            │ │
//!  └─────────────┘                           └────────────────────────────┼─┘
//!                                              Expo ◀── FCM ◀── APNs ◀────┘
//! ```

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod config;
mod db;
mod engine;
mod error;
mod models;
mod push;
mod routes;
mod state;

use auth::require_api_key;
use config::Config;
use routes::{
    monitor::{handle_tick, health_check},
    notify::{get_delivery_log, register_endpoint, send_notification},
};
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("watchtower=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║        WATCHTOWER — Position Risk Monitor             ║
  ║  PriceFeed · Evaluator · Guarded Close · Push Fan-out ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config + Database ──────────────────────────────────────────────────
    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;

    // ── 4. Shared state (HTTP client, provider clients, counters) ─────────────
    let state = build_state(pool, config);

    // ── 5. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let app = Router::new()
        // ── Monitor (scheduler-facing) ────────────────────────────────────────
        .route("/api/monitor/tick",     post(handle_tick))
        .route("/api/monitor/health",   get(health_check))
        // ── Notification service ──────────────────────────────────────────────
        .route("/api/notify",           post(send_notification))
        .route("/api/notify/register",  post(register_endpoint))
        .route("/api/notify/log",       get(get_delivery_log))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn(require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;

    info!(?addr, "🚀 Watchtower server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
