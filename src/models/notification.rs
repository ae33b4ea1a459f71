//! # models::notification
//!
//! Push endpoints, channel routing and the delivery audit record.
//!
//! ## Token classification
//! Historically the platform was guessed from the token shape at send time.
//! That ambiguity (a 64-char FCM token vs. an APNs device token) is resolved
//! by classifying **once at registration** and persisting the platform;
//! [`classify_token`] remains the single place where the shape rules live and
//! doubles as the fallback for legacy rows stored as `unknown`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many characters of a token the audit log is allowed to keep.
const TOKEN_PREFIX_LEN: usize = 12;

// ─── Platform ─────────────────────────────────────────────────────────────────

/// Stored per-endpoint platform tag (what the device registered as).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Expo,
    Ios,
    Android,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Expo    => "expo",
            Platform::Ios     => "ios",
            Platform::Android => "android",
            Platform::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "expo"    => Platform::Expo,
            "ios"     => Platform::Ios,
            "android" => Platform::Android,
            _ => Platform::Unknown,
        }
    }
}

// ─── Channel ──────────────────────────────────────────────────────────────────

/// Which provider client a send goes through. Derived from [`Platform`],
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Expo,
    Fcm,
    Apns,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Expo => "expo",
            Channel::Fcm  => "fcm",
            Channel::Apns => "apns",
        }
    }
}

// ─── Classification ───────────────────────────────────────────────────────────

/// Classify a raw device token into a [`Platform`].
///
/// Rules, in order:
/// 1. Expo-prefixed token → `Expo`, regardless of any platform hint.
/// 2. 64-character token with an `ios` hint → `Ios` (APNs device token).
/// 3. Anything else → `Android` (FCM registration token).
pub fn classify_token(token: &str, platform_hint: Option<&str>) -> Platform {
    if token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken[") {
        return Platform::Expo;
    }

    let hint_ios = platform_hint
        .map(|h| h.eq_ignore_ascii_case("ios"))
        .unwrap_or(false);

    if token.len() == 64 && hint_ios {
        return Platform::Ios;
    }

    Platform::Android
}

/// Resolve a stored platform to the provider channel that serves it.
pub fn channel_for(platform: Platform, token: &str) -> Channel {
    match platform {
        Platform::Expo    => Channel::Expo,
        Platform::Ios     => Channel::Apns,
        Platform::Android => Channel::Fcm,
        // Legacy rows registered before platforms were persisted.
        Platform::Unknown => match classify_token(token, None) {
            Platform::Expo => Channel::Expo,
            Platform::Ios  => Channel::Apns,
            _ => Channel::Fcm,
        },
    }
}

// ─── NotificationEndpoint ─────────────────────────────────────────────────────

/// One registered device token. A user may hold several (multi-device).
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEndpoint {
    pub user_id:  String,
    pub token:    String,
    pub platform: Platform,
    pub active:   bool,
}

impl NotificationEndpoint {
    /// Truncated token for logs and audit rows — enough to correlate,
    /// never the full credential.
    pub fn token_prefix(&self) -> String {
        token_prefix(&self.token)
    }
}

pub fn token_prefix(token: &str) -> String {
    if token.chars().count() <= TOKEN_PREFIX_LEN {
        token.to_string()
    } else {
        let head: String = token.chars().take(TOKEN_PREFIX_LEN).collect();
        format!("{head}…")
    }
}

// ─── Notify Request / Report ──────────────────────────────────────────────────

/// Input contract of the delivery orchestrator — reused by any producer
/// that wants to tell user X about event Y.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRequest {
    pub user_id: String,
    /// Event type, e.g. `position_closed`.
    #[serde(rename = "type")]
    pub event_type: String,
    pub title: String,
    pub body:  String,
    #[serde(default)]
    pub data:  Value,
}

/// Per-endpoint outcome inside a [`NotifyReport`].
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    pub channel:      Channel,
    pub token_prefix: String,
    pub success:      bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error:        Option<String>,
}

/// Aggregated fan-out result: `success` means at least one device got it.
#[derive(Debug, Clone, Serialize)]
pub struct NotifyReport {
    pub success: bool,
    pub sent:    u32,
    pub failed:  u32,
    pub results: Vec<AttemptResult>,
}

impl NotifyReport {
    pub fn from_results(results: Vec<AttemptResult>) -> Self {
        let sent   = results.iter().filter(|r| r.success).count() as u32;
        let failed = results.len() as u32 - sent;
        Self { success: sent > 0, sent, failed, results }
    }
}

// ─── DeliveryAttempt (audit record) ───────────────────────────────────────────

/// One row of the delivery audit log.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    pub user_id:      String,
    pub event_type:   String,
    pub channel:      Channel,
    pub token_prefix: String,
    pub success:      bool,
    pub error:        Option<String>,
    pub created_at:   DateTime<Utc>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expo_prefix_beats_platform_hint() {
        let token = "ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]";
        assert_eq!(classify_token(token, Some("ios")), Platform::Expo);
        assert_eq!(classify_token(token, Some("android")), Platform::Expo);
        assert_eq!(channel_for(Platform::Expo, token), Channel::Expo);
    }

    #[test]
    fn test_64_char_ios_token_routes_to_apns() {
        let token = "a".repeat(64);
        assert_eq!(classify_token(&token, Some("ios")), Platform::Ios);
        assert_eq!(channel_for(Platform::Ios, &token), Channel::Apns);
    }

    #[test]
    fn test_64_char_token_without_ios_hint_is_fcm() {
        let token = "a".repeat(64);
        assert_eq!(classify_token(&token, None), Platform::Android);
        assert_eq!(classify_token(&token, Some("android")), Platform::Android);
    }

    #[test]
    fn test_other_shapes_route_to_fcm() {
        let token = "fGcM-registration:token-shape";
        assert_eq!(classify_token(token, Some("ios")), Platform::Android);
        assert_eq!(channel_for(Platform::Android, token), Channel::Fcm);
    }

    #[test]
    fn test_unknown_platform_falls_back_to_shape() {
        let expo = "ExpoPushToken[yyyyyyyyyyyyyyyy]";
        assert_eq!(channel_for(Platform::Unknown, expo), Channel::Expo);
        assert_eq!(channel_for(Platform::Unknown, "short-token"), Channel::Fcm);
    }

    #[test]
    fn test_token_prefix_truncates() {
        let prefix = token_prefix("ExponentPushToken[abcdef]");
        assert_eq!(prefix, "ExponentPush…");
        assert_eq!(token_prefix("short"), "short");
    }

    #[test]
    fn test_report_aggregation() {
        let report = NotifyReport::from_results(vec![
            AttemptResult {
                channel: Channel::Expo,
                token_prefix: "Exponent…".into(),
                success: true,
                error: None,
            },
            AttemptResult {
                channel: Channel::Fcm,
                token_prefix: "fGcM…".into(),
                success: false,
                error: Some("HTTP 503".into()),
            },
        ]);
        assert!(report.success);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
    }
}
