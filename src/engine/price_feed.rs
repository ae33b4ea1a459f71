//! # engine::price_feed
//!
//! **PriceFeed** — one reference-price snapshot per monitor pass.
//!
//! A single GET against the exchange's public ticker-list endpoint, then one
//! case-insensitive filter pass over the requested symbol set. Any failure
//! (network, non-2xx, unparseable body) yields an **empty map** and the
//! caller aborts the tick — positions are never judged against missing or
//! partial prices. No retry/backoff here.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, warn};

/// One entry of the exchange ticker list. Exchanges commonly serialize the
/// price as a JSON string, so accept both.
#[derive(Debug, Deserialize)]
struct TickerEntry {
    symbol: String,
    #[serde(deserialize_with = "de_string_or_f64")]
    price:  f64,
}

fn de_string_or_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        Str(String),
        Num(f64),
    }

    match StringOrFloat::deserialize(deserializer)? {
        StringOrFloat::Num(v) => Ok(v),
        StringOrFloat::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// ─── Fetch ────────────────────────────────────────────────────────────────────

/// Fetch current prices for `symbols` from `{base}/ticker/price`.
///
/// Returns `symbol → price` keyed by the **requested** casing. Empty map on
/// any failure; the caller treats that as "skip this tick".
pub async fn fetch_prices(
    client:   &reqwest::Client,
    base_url: &str,
    symbols:  &HashSet<String>,
) -> HashMap<String, f64> {
    if symbols.is_empty() {
        return HashMap::new();
    }

    let url = format!("{}/ticker/price", base_url.trim_end_matches('/'));

    let response = match client
        .get(&url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, url, "Price feed unreachable");
            return HashMap::new();
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), url, "Price feed returned HTTP error");
        return HashMap::new();
    }

    let tickers: Vec<TickerEntry> = match response.json().await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "Price feed body parse failed");
            return HashMap::new();
        }
    };

    filter_snapshot(tickers, symbols)
}

/// Single filter pass, case-insensitive on the exchange side, preserving the
/// caller's casing in the result keys.
fn filter_snapshot(
    tickers: Vec<TickerEntry>,
    symbols: &HashSet<String>,
) -> HashMap<String, f64> {
    let wanted: HashMap<String, &String> = symbols
        .iter()
        .map(|s| (s.to_uppercase(), s))
        .collect();

    let mut snapshot = HashMap::with_capacity(symbols.len());
    for ticker in tickers {
        if let Some(original) = wanted.get(&ticker.symbol.to_uppercase()) {
            snapshot.insert((*original).clone(), ticker.price);
        }
    }

    snapshot
}

// ─── Tests ────────────────────────────────────────────────────────────────────
