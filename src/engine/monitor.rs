//! # engine::monitor
//!
//! **MonitorCron** — one scheduled pass over every watched position.
//!
//! ```text
//! 1. Load OPEN positions with both thresholds set
//! 2. Fetch ONE price snapshot for their symbols (empty → abort tick)
//! 3. Per position: evaluate → guarded close → notify owner
//! ```
//! Overlapping invocations are expected and safe: the conditional UPDATE in
//! the store is the only guard, and a lost race simply skips the
//! notification. Positions are independent; processing order is irrelevant.
//!
//! The pass itself ([`tick_pass`]) talks to the store and the notifier
//! through two small traits, the same seam pattern the delivery fan-out
//! uses — that is what keeps the abort / skip / lost-race branches testable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::{self, CloseOutcome};
use crate::engine::{evaluator, price_feed};
use crate::models::{ClosedFill, ExitReason, NotifyReport, NotifyRequest, Position};
use crate::push::DeliveryOrchestrator;
use crate::state::SharedState;

// ─── TickSummary ──────────────────────────────────────────────────────────────

/// What one monitor pass did — returned to the scheduler and logged.
#[derive(Debug, Default, Serialize)]
pub struct TickSummary {
    /// Tick abandoned before evaluation (price feed unavailable).
    pub aborted:          bool,
    pub open_positions:   usize,
    pub evaluated:        usize,
    pub triggered:        usize,
    pub closed:           usize,
    /// Lost races: a concurrent invocation closed the position first.
    pub already_closed:   usize,
    pub notified:         usize,
    /// Symbol absent from the snapshot — position left untouched.
    pub skipped_no_price: usize,
}

// ─── Seams ────────────────────────────────────────────────────────────────────

/// The guarded-close side of the store, as seen by the tick pass.
#[async_trait]
trait CloseStore: Send + Sync {
    async fn close(
        &self,
        position: &Position,
        price:    f64,
        reason:   ExitReason,
    ) -> anyhow::Result<CloseOutcome>;
}

/// The delivery side, as seen by the tick pass.
#[async_trait]
trait Notifier: Send + Sync {
    async fn notify(&self, request: &NotifyRequest) -> anyhow::Result<NotifyReport>;
}

struct PgCloseStore<'a> {
    pool: &'a PgPool,
}

#[async_trait]
impl CloseStore for PgCloseStore<'_> {
    async fn close(
        &self,
        position: &Position,
        price:    f64,
        reason:   ExitReason,
    ) -> anyhow::Result<CloseOutcome> {
        db::close_position(self.pool, position, price, reason).await
    }
}

struct FanOutNotifier<'a> {
    pool:         &'a PgPool,
    orchestrator: &'a DeliveryOrchestrator,
}

#[async_trait]
impl Notifier for FanOutNotifier<'_> {
    async fn notify(&self, request: &NotifyRequest) -> anyhow::Result<NotifyReport> {
        self.orchestrator.notify_user(self.pool, request).await
    }
}

// ─── Tick Pass ────────────────────────────────────────────────────────────────

/// Run one monitor tick. Never fails the whole pass for a single position;
/// only infrastructure errors (position load) propagate.
pub async fn run_tick(state: &SharedState) -> anyhow::Result<TickSummary> {
    state.tick_count.fetch_add(1, Ordering::Relaxed);

    // ── 1. Load watched positions ─────────────────────────────────────────────
    let positions = db::load_open_positions(&state.db).await?;

    if positions.is_empty() {
        info!("Monitor tick: no open positions to watch");
        return Ok(TickSummary::default());
    }

    // ── 2. One snapshot for the whole pass ────────────────────────────────────
    let symbols: HashSet<String> = positions.iter().map(|p| p.symbol.clone()).collect();
    let snapshot =
        price_feed::fetch_prices(&state.http_client, &state.config.exchange_base_url, &symbols)
            .await;

    // ── 3. Evaluate / close / notify ──────────────────────────────────────────
    let store    = PgCloseStore { pool: &state.db };
    let notifier = FanOutNotifier { pool: &state.db, orchestrator: state.orchestrator.as_ref() };

    let summary = tick_pass(
        &positions,
        &snapshot,
        state.config.maintenance_margin_rate,
        &store,
        &notifier,
    )
    .await?;

    state.close_count.fetch_add(summary.closed as u64, Ordering::Relaxed);

    info!(
        open      = summary.open_positions,
        evaluated = summary.evaluated,
        triggered = summary.triggered,
        closed    = summary.closed,
        races     = summary.already_closed,
        notified  = summary.notified,
        "📊 Monitor tick complete"
    );

    Ok(summary)
}

/// The per-position decision loop, over an already-loaded position set and an
/// already-fetched snapshot.
async fn tick_pass(
    positions: &[Position],
    snapshot:  &HashMap<String, f64>,
    mmr:       f64,
    store:     &dyn CloseStore,
    notifier:  &dyn Notifier,
) -> anyhow::Result<TickSummary> {
    let mut summary = TickSummary { open_positions: positions.len(), ..Default::default() };

    if snapshot.is_empty() {
        // Fail-safe: better to skip a tick than to judge positions against
        // missing data.
        warn!(
            positions = positions.len(),
            "⏭️ Price snapshot empty — aborting this tick"
        );
        summary.aborted = true;
        return Ok(summary);
    }

    for position in positions {
        let Some(&price) = snapshot.get(&position.symbol) else {
            summary.skipped_no_price += 1;
            continue;
        };

        summary.evaluated += 1;

        let Some(reason) = evaluator::evaluate(position, price, mmr) else {
            continue;
        };
        summary.triggered += 1;

        info!(
            position_id = %position.id,
            symbol      = %position.symbol,
            direction   = ?position.direction,
            price,
            reason      = reason.as_str(),
            "🎯 Trigger hit — attempting guarded close"
        );

        // ── Guarded close (at-most-once) ──────────────────────────────────────
        match store.close(position, price, reason).await? {
            CloseOutcome::AlreadyClosed => {
                // A concurrent tick or a user-initiated close got here first.
                // No duplicate alert.
                summary.already_closed += 1;
                info!(position_id = %position.id, "Already closed by a concurrent invocation — skipping notification");
            }
            CloseOutcome::Closed(fill) => {
                summary.closed += 1;

                info!(
                    position_id = %position.id,
                    exit_price  = fill.exit_price,
                    pnl         = fill.realized_pnl,
                    roe_pct     = fill.realized_pnl_pct,
                    result      = fill.result.as_str(),
                    "✅ Position closed"
                );

                // ── Fan-out — a delivery failure never aborts the pass ────────
                let request = close_notification(position, &fill);
                match notifier.notify(&request).await {
                    Ok(report) if report.success => summary.notified += 1,
                    Ok(report) => {
                        warn!(
                            position_id = %position.id,
                            failed      = report.failed,
                            "Close notification reached no device"
                        );
                    }
                    Err(e) => {
                        warn!(position_id = %position.id, error = %e, "Close notification errored");
                    }
                }
            }
        }
    }

    Ok(summary)
}

// ─── Notification Content ─────────────────────────────────────────────────────

/// Compose the user-facing close alert for one fill.
fn close_notification(position: &Position, fill: &ClosedFill) -> NotifyRequest {
    let title = match fill.exit_reason {
        ExitReason::TakeProfit  => "🎯 Take Profit Hit",
        ExitReason::StopLoss    => "🛑 Stop Loss Triggered",
        ExitReason::Liquidation => "⚠️ Position Liquidated",
    };

    let body = format!(
        "{} {} closed at {:.4} · PnL {:+.2} ({:+.1}%)",
        position.symbol,
        position.direction.as_str(),
        fill.exit_price,
        fill.realized_pnl,
        fill.realized_pnl_pct,
    );

    NotifyRequest {
        user_id:    position.user_id.clone(),
        event_type: "position_closed".to_string(),
        title:      title.to_string(),
        body,
        data: json!({
            "position_id": position.id,
            "symbol":      position.symbol,
            "direction":   position.direction.as_str(),
            "exit_reason": fill.exit_reason.as_str(),
            "exit_price":  fill.exit_price,
            "pnl":         fill.realized_pnl,
            "roe_pct":     fill.realized_pnl_pct,
            "result":      fill.result.as_str(),
        }),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
