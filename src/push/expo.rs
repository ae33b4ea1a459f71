//! # push::expo
//!
//! **ExpoClient** — the simple channel: one JSON POST, no signing.
//!
//! Expo's push gateway answers HTTP 200 even for per-ticket failures, so
//! success is judged on the ticket's `status` field, not the HTTP status.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::models::Channel;
use crate::push::{PushChannel, PushError, PushNote};

pub struct ExpoClient {
    http: reqwest::Client,
    url:  String,
}

impl ExpoClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl PushChannel for ExpoClient {
    fn channel(&self) -> Channel {
        Channel::Expo
    }

    async fn send(&self, token: &str, note: &PushNote) -> Result<(), PushError> {
        let payload = json!({
            "to":        token,
            "title":     note.title,
            "body":      note.body,
            "data":      note.data,
            "sound":     "default",
            "badge":     1,
            "channelId": "default",
        });

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Provider { status: status.as_u16(), body });
        }

        let body: Value = response.json().await?;
        interpret_ticket(&body).map(|()| {
            debug!(ticket_id = ?body["data"]["id"].as_str(), "Expo accepted push");
        })
    }
}

/// Judge one push ticket. The gateway answers HTTP 200 even for per-device
/// failures, so the verdict lives entirely in the ticket body.
fn interpret_ticket(body: &Value) -> Result<(), PushError> {
    let ticket = &body["data"];

    match ticket["status"].as_str() {
        Some("ok") => Ok(()),
        _ => {
            // DeviceNotRegistered means the token will never work again.
            if ticket["details"]["error"].as_str() == Some("DeviceNotRegistered") {
                return Err(PushError::Gone);
            }
            let message = ticket["message"].as_str().unwrap_or("unknown ticket error");
            Err(PushError::Provider { status: 200, body: message.to_string() })
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_ticket_is_success() {
        let body = json!({ "data": { "status": "ok", "id": "ticket-1" } });
        assert!(interpret_ticket(&body).is_ok());
    }

    #[test]
    fn test_device_not_registered_maps_to_gone() {
        let body = json!({
            "data": {
                "status":  "error",
                "message": "\"ExponentPushToken[xxx]\" is not a registered push notification recipient",
                "details": { "error": "DeviceNotRegistered" },
            }
        });
        match interpret_ticket(&body) {
            Err(PushError::Gone) => {}
            other => panic!("expected Gone, got {other:?}"),
        }
    }

    #[test]
    fn test_error_ticket_surfaces_the_message() {
        let body = json!({
            "data": {
                "status":  "error",
                "message": "Message too big",
                "details": { "error": "MessageTooBig" },
            }
        });
        match interpret_ticket(&body) {
            Err(PushError::Provider { body, .. }) => assert!(body.contains("Message too big")),
            other => panic!("expected Provider, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_ticket_is_not_success() {
        // A 200 with an unexpected body must never count as delivered.
        let body = json!({ "errors": [{ "code": "PUSH_TOO_MANY_EXPERIENCE_IDS" }] });
        assert!(interpret_ticket(&body).is_err());
    }
}
