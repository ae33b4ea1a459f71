//! # push::apns
//!
//! **ApnsClient** — Apple Push Notification service over the HTTP/2 device
//! API, authenticated with a hand-built ES256 provider token.
//!
//! The ECDSA signature comes out of the signer DER-encoded; APNs wants the
//! raw 64-byte `r‖s` form — [`crate::push::jwt::der_to_raw`] handles that.
//! HTTP/2 is negotiated by ALPN through the shared rustls client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ApnsConfig;
use crate::models::Channel;
use crate::push::{jwt, PushChannel, PushError, PushNote};

pub struct ApnsClient {
    http:   reqwest::Client,
    config: Option<ApnsConfig>,
}

impl ApnsClient {
    pub fn new(http: reqwest::Client, config: Option<ApnsConfig>) -> Self {
        Self { http, config }
    }

    /// Provider token: `{alg: ES256, kid}` / `{iss: teamId, iat: now}`.
    /// Minted fresh per send; Apple allows reuse for up to an hour but a new
    /// token per call keeps the client stateless.
    fn provider_token(&self, config: &ApnsConfig) -> Result<String, PushError> {
        let token = jwt::encode_es256(
            &json!({"alg": "ES256", "kid": config.key_id}),
            &json!({"iss": config.team_id, "iat": Utc::now().timestamp()}),
            &config.private_key,
        )?;
        Ok(token)
    }
}

/// APNs payload: standard `aps` dictionary with any custom data keys merged
/// alongside it at the top level.
fn build_payload(note: &PushNote) -> Value {
    let mut payload = json!({
        "aps": {
            "alert": {
                "title": note.title,
                "body":  note.body,
            },
            "sound":           "default",
            "badge":           1,
            "mutable-content": 1,
        },
    });

    if let (Some(object), Some(data)) = (payload.as_object_mut(), note.data.as_object()) {
        for (key, value) in data {
            if key != "aps" {
                object.insert(key.clone(), value.clone());
            }
        }
    }

    payload
}

#[async_trait]
impl PushChannel for ApnsClient {
    fn channel(&self) -> Channel {
        Channel::Apns
    }

    async fn send(&self, token: &str, note: &PushNote) -> Result<(), PushError> {
        let config = self.config.as_ref().ok_or(PushError::NotConfigured)?;

        let provider_token = self.provider_token(config)?;
        let url = format!("{}/3/device/{token}", config.host());

        let response = self
            .http
            .post(&url)
            .header("authorization", format!("bearer {provider_token}"))
            .header("apns-topic", &config.bundle_id)
            .header("apns-push-type", "alert")
            .header("apns-priority", "10")
            .json(&build_payload(note))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200 => {
                debug!(apns_id = ?response.headers().get("apns-id"), "APNs accepted push");
                Ok(())
            }
            // 410 Gone: the device token is no longer active for this topic.
            410 => Err(PushError::Gone),
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(PushError::Provider { status: code, body })
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
