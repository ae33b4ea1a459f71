//! # state
//!
//! AppState shared by every handler: DB pool, one reqwest Client, parsed
//! config, the delivery orchestrator and a pair of liveness counters.
//!
//! No long-lived domain state lives here — each monitor tick is a stateless
//! pass; everything durable is in PostgreSQL.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::push::{apns::ApnsClient, expo::ExpoClient, fcm::FcmClient, DeliveryOrchestrator};

// ─── AppState ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    /// reqwest Client shared across price feed and providers (thread-safe,
    /// connection pooling; APNs gets HTTP/2 via ALPN on the same client).
    pub http_client: reqwest::Client,

    pub config: Arc<Config>,

    pub orchestrator: Arc<DeliveryOrchestrator>,

    // ── Liveness counters ─────────────────────────────────────────────────────
    pub tick_count:  Arc<AtomicU64>,
    pub close_count: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let http_client = reqwest::Client::new();

        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            Arc::new(ExpoClient::new(http_client.clone(), config.expo_push_url.clone())),
            Arc::new(FcmClient::new(http_client.clone(), config.fcm.clone())),
            Arc::new(ApnsClient::new(http_client.clone(), config.apns.clone())),
        ));

        Self {
            db,
            http_client,
            config: Arc::new(config),
            orchestrator,
            tick_count:  Arc::new(AtomicU64::new(0)),
            close_count: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

pub fn build_state(db: PgPool, config: Config) -> SharedState {
    Arc::new(AppState::new(db, config))
}
