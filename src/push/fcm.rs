//! # push::fcm
//!
//! **FcmClient** — Firebase Cloud Messaging v1, two-step:
//!
//! 1. Build an RS256 JWT-bearer assertion from the service account and
//!    exchange it at Google's OAuth2 token endpoint for a bearer token.
//! 2. POST the message to `projects/{id}/messages:send`.
//!
//! A fresh access token is minted per send. That is a deliberate
//! correctness-over-efficiency trade-off, not an oversight — a cache keyed
//! on expiry would be the optimization if send volume ever warrants it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::FcmConfig;
use crate::models::Channel;
use crate::push::{jwt, PushChannel, PushError, PushNote};

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const FCM_API_BASE: &str = "https://fcm.googleapis.com/v1";

pub struct FcmClient {
    http:   reqwest::Client,
    config: Option<FcmConfig>,
}

impl FcmClient {
    pub fn new(http: reqwest::Client, config: Option<FcmConfig>) -> Self {
        Self { http, config }
    }

    // ─── OAuth2 jwt-bearer exchange ───────────────────────────────────────────

    async fn mint_access_token(&self, config: &FcmConfig) -> Result<String, PushError> {
        let iat = Utc::now().timestamp();
        let assertion = jwt::encode_rs256(
            &json!({"alg": "RS256", "typ": "JWT"}),
            &oauth_claims(config, iat),
            &config.private_key,
        )?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .http
            .post(&config.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Auth(format!("token exchange HTTP {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PushError::Auth(format!("token response parse: {e}")))?;

        Ok(token.access_token)
    }
}

/// Claims of the jwt-bearer assertion. `iss` and `sub` are both the service
/// account email; the token lives one hour.
fn oauth_claims(config: &FcmConfig, iat: i64) -> Value {
    json!({
        "iss":   config.client_email,
        "sub":   config.client_email,
        "aud":   config.token_uri,
        "iat":   iat,
        "exp":   iat + 3600,
        "scope": MESSAGING_SCOPE,
    })
}

/// FCM v1 `data` values must all be strings — stringify anything that isn't.
/// Non-object payloads land under a single `payload` key.
fn stringify_data(data: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                let s = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.insert(key.clone(), Value::String(s));
            }
        }
        Value::Null => {}
        other => {
            out.insert("payload".to_string(), Value::String(other.to_string()));
        }
    }
    out
}

#[async_trait]
impl PushChannel for FcmClient {
    fn channel(&self) -> Channel {
        Channel::Fcm
    }

    async fn send(&self, token: &str, note: &PushNote) -> Result<(), PushError> {
        let config = self.config.as_ref().ok_or(PushError::NotConfigured)?;

        let access_token = self.mint_access_token(config).await?;

        let message = json!({
            "message": {
                "token": token,
                "notification": {
                    "title": note.title,
                    "body":  note.body,
                },
                "data": stringify_data(&note.data),
                "android": {
                    "priority": "HIGH",
                    "notification": {
                        "channel_id":   "default",
                        "sound":        "default",
                        "click_action": "OPEN_APP",
                    },
                },
            },
        });

        let url = format!("{FCM_API_BASE}/projects/{}/messages:send", config.project_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&access_token)
            .json(&message)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("FCM accepted push");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();

        // v1 reports dead registration tokens as 404 / UNREGISTERED.
        if status.as_u16() == 404 || body.contains("UNREGISTERED") {
            return Err(PushError::Gone);
        }

        Err(PushError::Provider { status: status.as_u16(), body })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FcmConfig {
        FcmConfig {
            project_id:   "demo-project".into(),
            client_email: "svc@demo-project.iam.gserviceaccount.com".into(),
            private_key:  "unused-here".into(),
            token_uri:    "https://oauth2.googleapis.com/token".into(),
        }
    }

    #[test]
    fn test_oauth_claims_shape() {
        let claims = oauth_claims(&config(), 1_700_000_000);
        assert_eq!(claims["iss"], claims["sub"]);
        assert_eq!(claims["aud"], "https://oauth2.googleapis.com/token");
        assert_eq!(claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(), 3600);
        assert_eq!(claims["scope"], MESSAGING_SCOPE);
    }

    #[test]
    fn test_stringify_data_flattens_values() {
        let data = json!({
            "position_id": "abc",
            "pnl":         12.5,
            "win":         true,
            "nested":      {"a": 1},
        });
        let out = stringify_data(&data);
        assert_eq!(out["position_id"], "abc");
        assert_eq!(out["pnl"], "12.5");
        assert_eq!(out["win"], "true");
        assert_eq!(out["nested"], r#"{"a":1}"#);
    }

    #[test]
    fn test_stringify_data_non_object() {
        assert!(stringify_data(&Value::Null).is_empty());
        let out = stringify_data(&json!([1, 2]));
        assert_eq!(out["payload"], "[1,2]");
    }

    #[tokio::test]
    async fn test_unconfigured_channel_reports_not_configured() {
        let client = FcmClient::new(reqwest::Client::new(), None);
        let note = PushNote {
            title: "t".into(),
            body:  "b".into(),
            data:  Value::Null,
        };
        let err = client.send("some-token", &note).await.unwrap_err();
        assert!(matches!(err, PushError::NotConfigured));
    }
}
