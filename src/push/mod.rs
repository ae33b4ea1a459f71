//! # push — Multi-Provider Delivery Pipeline
//!
//! One logical event fans out to every registered device of a user across
//! heterogeneous channels (Expo / FCM / APNs). Each endpoint is dispatched
//! independently: a failing channel never blocks the others, every attempt
//! leaves an audit row, and `success` means *at least one* device got it.
//!
//! There is deliberately no retry queue or dead-letter handling — alerting
//! is best-effort per tick.

pub mod apns;
pub mod expo;
pub mod fcm;
pub mod jwt;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::db;
use crate::models::{
    channel_for, token_prefix, AttemptResult, Channel, DeliveryAttempt, NotificationEndpoint,
    NotifyReport, NotifyRequest,
};

// ─── PushError ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PushError {
    /// Channel credentials absent — a per-channel configuration gap,
    /// reported as an explicit result and never retried.
    #[error("channel not configured")]
    NotConfigured,

    /// Could not reach the provider at all.
    #[error("network error: {0}")]
    Network(String),

    /// Provider answered with a non-success status.
    #[error("provider rejected: HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    /// Provider says the device token is no longer registered
    /// (APNs 410, FCM UNREGISTERED). The endpoint gets deactivated.
    #[error("token no longer registered")]
    Gone,

    /// Building or exchanging the provider JWT failed.
    #[error("auth failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        PushError::Network(e.to_string())
    }
}

impl From<jwt::JwtError> for PushError {
    fn from(e: jwt::JwtError) -> Self {
        PushError::Auth(e.to_string())
    }
}

// ─── PushNote ─────────────────────────────────────────────────────────────────

/// Provider-agnostic notification content.
#[derive(Debug, Clone)]
pub struct PushNote {
    pub title: String,
    pub body:  String,
    pub data:  Value,
}

// ─── PushChannel ──────────────────────────────────────────────────────────────

/// One provider client. The orchestrator only ever talks through this seam,
/// which is what makes the fan-out testable with stub channels.
#[async_trait]
pub trait PushChannel: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, token: &str, note: &PushNote) -> Result<(), PushError>;
}

// ─── DeliveryOrchestrator ─────────────────────────────────────────────────────

pub struct DeliveryOrchestrator {
    expo: Arc<dyn PushChannel>,
    fcm:  Arc<dyn PushChannel>,
    apns: Arc<dyn PushChannel>,
}

/// Fan-out outcome before it is folded into a [`NotifyReport`] — carries the
/// tokens the provider reported gone so the caller can deactivate them.
struct FanOut {
    results:     Vec<AttemptResult>,
    gone_tokens: Vec<String>,
}

impl DeliveryOrchestrator {
    pub fn new(
        expo: Arc<dyn PushChannel>,
        fcm:  Arc<dyn PushChannel>,
        apns: Arc<dyn PushChannel>,
    ) -> Self {
        Self { expo, fcm, apns }
    }

    fn client_for(&self, channel: Channel) -> &dyn PushChannel {
        match channel {
            Channel::Expo => self.expo.as_ref(),
            Channel::Fcm  => self.fcm.as_ref(),
            Channel::Apns => self.apns.as_ref(),
        }
    }

    /// Dispatch one note to every endpoint, isolating failures per endpoint.
    async fn fan_out(&self, endpoints: &[NotificationEndpoint], note: &PushNote) -> FanOut {
        let mut results     = Vec::with_capacity(endpoints.len());
        let mut gone_tokens = Vec::new();

        for endpoint in endpoints {
            let client = self.client_for(channel_for(endpoint.platform, &endpoint.token));
            // The audit row records the channel the client identifies as, not
            // the routing decision — the two must agree.
            let channel = client.channel();
            let outcome = client.send(&endpoint.token, note).await;

            let (success, error) = match outcome {
                Ok(()) => (true, None),
                Err(PushError::Gone) => {
                    gone_tokens.push(endpoint.token.clone());
                    (false, Some(PushError::Gone.to_string()))
                }
                Err(e) => (false, Some(e.to_string())),
            };

            results.push(AttemptResult {
                channel,
                token_prefix: endpoint.token_prefix(),
                success,
                error,
            });
        }

        FanOut { results, gone_tokens }
    }

    /// **The notification entry point** — list endpoints, fan out, audit,
    /// report. Reused by the monitor and by direct `/api/notify` callers.
    pub async fn notify_user(
        &self,
        pool: &PgPool,
        req:  &NotifyRequest,
    ) -> anyhow::Result<NotifyReport> {
        let endpoints = db::list_endpoints(pool, &req.user_id).await?;

        if endpoints.is_empty() {
            info!(user_id = %req.user_id, event = %req.event_type, "No endpoints registered — nothing to deliver");
            return Ok(NotifyReport::from_results(Vec::new()));
        }

        let note = PushNote {
            title: req.title.clone(),
            body:  req.body.clone(),
            data:  req.data.clone(),
        };

        let fan_out = self.fan_out(&endpoints, &note).await;

        // ── Audit: one row per attempt (best-effort, never blocks the report)
        for result in &fan_out.results {
            let attempt = DeliveryAttempt {
                user_id:      req.user_id.clone(),
                event_type:   req.event_type.clone(),
                channel:      result.channel,
                token_prefix: result.token_prefix.clone(),
                success:      result.success,
                error:        result.error.clone(),
                created_at:   Utc::now(),
            };
            if let Err(e) = db::insert_delivery(pool, &attempt).await {
                warn!(error = %e, "Failed to write delivery audit row");
            }
        }

        // ── Dead tokens: stop fanning out to them next time ───────────────────
        for token in &fan_out.gone_tokens {
            if let Err(e) = db::deactivate_endpoint(pool, token).await {
                warn!(error = %e, prefix = %token_prefix(token), "Failed to deactivate dead endpoint");
            } else {
                info!(prefix = %token_prefix(token), "🧹 Deactivated unregistered endpoint");
            }
        }

        let report = NotifyReport::from_results(fan_out.results);
        info!(
            user_id = %req.user_id,
            event   = %req.event_type,
            sent    = report.sent,
            failed  = report.failed,
            "📨 Delivery fan-out complete"
        );

        Ok(report)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    /// Stub channel: succeeds or fails wholesale, or reports Gone for one
    /// specific token.
    struct StubChannel {
        channel:    Channel,
        fail:       bool,
        gone_token: Option<String>,
    }

    #[async_trait]
    impl PushChannel for StubChannel {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, token: &str, _note: &PushNote) -> Result<(), PushError> {
            if self.gone_token.as_deref() == Some(token) {
                return Err(PushError::Gone);
            }
            if self.fail {
                return Err(PushError::Provider { status: 503, body: "unavailable".into() });
            }
            Ok(())
        }
    }

    fn orchestrator(expo_fail: bool, fcm_fail: bool) -> DeliveryOrchestrator {
        DeliveryOrchestrator::new(
            Arc::new(StubChannel { channel: Channel::Expo, fail: expo_fail, gone_token: None }),
            Arc::new(StubChannel { channel: Channel::Fcm, fail: fcm_fail, gone_token: None }),
            Arc::new(StubChannel { channel: Channel::Apns, fail: false, gone_token: None }),
        )
    }

    fn endpoint(token: &str, platform: Platform) -> NotificationEndpoint {
        NotificationEndpoint {
            user_id:  "user-1".into(),
            token:    token.into(),
            platform,
            active:   true,
        }
    }

    fn note() -> PushNote {
        PushNote {
            title: "Take profit hit".into(),
            body:  "BTCUSDT closed at 52,500".into(),
            data:  serde_json::json!({"symbol": "BTCUSDT"}),
        }
    }

    #[tokio::test]
    async fn test_partial_delivery_one_of_two() {
        // Expo succeeds, FCM is down → success:true, sent:1, failed:1.
        let orch = orchestrator(false, true);
        let endpoints = vec![
            endpoint("ExponentPushToken[aaaa]", Platform::Expo),
            endpoint("fcm-registration-token", Platform::Android),
        ];

        let fan_out = orch.fan_out(&endpoints, &note()).await;
        let report = NotifyReport::from_results(fan_out.results);

        assert!(report.success);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.results[0].channel, Channel::Expo);
        assert!(report.results[0].success);
        assert_eq!(report.results[1].channel, Channel::Fcm);
        assert!(report.results[1].error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_all_channels_down_is_not_success() {
        let orch = orchestrator(true, true);
        let endpoints = vec![
            endpoint("ExponentPushToken[aaaa]", Platform::Expo),
            endpoint("fcm-registration-token", Platform::Android),
        ];

        let fan_out = orch.fan_out(&endpoints, &note()).await;
        let report = NotifyReport::from_results(fan_out.results);

        assert!(!report.success);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn test_gone_token_is_collected_for_deactivation() {
        let apns_token = "a".repeat(64);
        let orch = DeliveryOrchestrator::new(
            Arc::new(StubChannel { channel: Channel::Expo, fail: false, gone_token: None }),
            Arc::new(StubChannel { channel: Channel::Fcm, fail: false, gone_token: None }),
            Arc::new(StubChannel {
                channel:    Channel::Apns,
                fail:       false,
                gone_token: Some(apns_token.clone()),
            }),
        );

        let endpoints = vec![endpoint(&apns_token, Platform::Ios)];
        let fan_out = orch.fan_out(&endpoints, &note()).await;

        assert_eq!(fan_out.gone_tokens, vec![apns_token]);
        assert!(!fan_out.results[0].success);
    }

    #[tokio::test]
    async fn test_routing_follows_stored_platform() {
        let orch = orchestrator(false, false);
        let endpoints = vec![
            endpoint("ExponentPushToken[aaaa]", Platform::Expo),
            endpoint(&"b".repeat(64), Platform::Ios),
            endpoint("anything-else", Platform::Android),
        ];

        let fan_out = orch.fan_out(&endpoints, &note()).await;
        let channels: Vec<Channel> = fan_out.results.iter().map(|r| r.channel).collect();
        assert_eq!(channels, vec![Channel::Expo, Channel::Apns, Channel::Fcm]);
    }

    #[tokio::test]
    async fn test_audit_results_never_leak_full_token() {
        let orch = orchestrator(false, false);
        let token = "ExponentPushToken[secret-secret-secret]";
        let fan_out = orch.fan_out(&[endpoint(token, Platform::Expo)], &note()).await;

        let prefix = &fan_out.results[0].token_prefix;
        assert!(prefix.len() < token.len());
        assert!(!prefix.contains("secret-secret"));
    }
}
