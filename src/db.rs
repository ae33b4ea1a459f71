//! # db — PostgreSQL Storage Layer
//!
//! `sqlx` (async Postgres) behind plain runtime-bound queries.
//!
//! The one operation with a real correctness invariant lives here:
//! [`close_position`] is a single conditional UPDATE guarded on
//! `status = 'OPEN'`. Zero affected rows is **not** an error — it means a
//! concurrent invocation (overlapping tick, or a user-initiated close) won
//! the race, and the caller must skip the notification.
//!
//! ## Setup
//! 1. Create a database and set `DATABASE_URL` in `.env`
//! 2. Migrations are embedded and run at startup

use std::collections::HashSet;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    classify_token, ClosedFill, DeliveryAttempt, Direction, ExitReason, NotificationEndpoint,
    Platform, Position, PositionStatus,
};

// ─── Pool Init ────────────────────────────────────────────────────────────────

/// Connect and run the embedded migration.
pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    // Simple-protocol execute: the migration file holds multiple statements.
    pool.execute(include_str!("../migrations/001_init.sql"))
        .await
        .context("Failed to run migration 001_init.sql")?;

    info!("✅ PostgreSQL connected and migrations applied");
    Ok(pool)
}

// ─── Positions ────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct PositionRow {
    id:          Uuid,
    user_id:     String,
    symbol:      String,
    direction:   String,
    entry_price: f64,
    quantity:    f64,
    margin:      f64,
    leverage:    f64,
    stop_loss:   Option<f64>,
    take_profit: Option<f64>,
}

impl PositionRow {
    fn into_position(self) -> anyhow::Result<Position> {
        let direction = Direction::parse(&self.direction)
            .with_context(|| format!("Position {} has bad direction '{}'", self.id, self.direction))?;

        Ok(Position {
            id:          self.id,
            user_id:     self.user_id,
            symbol:      self.symbol,
            direction,
            entry_price: self.entry_price,
            quantity:    self.quantity,
            margin:      self.margin,
            leverage:    self.leverage.max(1.0),
            stop_loss:   self.stop_loss,
            take_profit: self.take_profit,
            status:      PositionStatus::Open,
        })
    }
}

/// Every OPEN position with **both** thresholds set — the monitor only
/// watches positions it can fully judge.
pub async fn load_open_positions(pool: &PgPool) -> anyhow::Result<Vec<Position>> {
    let rows: Vec<PositionRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, symbol, direction, entry_price, quantity,
               margin, leverage, stop_loss, take_profit
        FROM positions
        WHERE status = 'OPEN'
          AND stop_loss IS NOT NULL
          AND take_profit IS NOT NULL
        "#,
    )
    .fetch_all(pool)
    .await
    .context("load_open_positions failed")?;

    rows.into_iter().map(PositionRow::into_position).collect()
}

// ─── Guarded Close ────────────────────────────────────────────────────────────

/// Result of a guarded close attempt.
#[derive(Debug)]
pub enum CloseOutcome {
    /// This invocation performed the OPEN → CLOSED transition.
    Closed(ClosedFill),
    /// Another invocation already closed it — skip the notification.
    AlreadyClosed,
}

/// Atomically close a position at `close_price`.
///
/// The `AND status = 'OPEN'` predicate is the entire concurrency story:
/// a compare-and-swap on status, no locks. Exactly one of any number of
/// concurrent callers observes an affected row.
pub async fn close_position(
    pool:        &PgPool,
    position:    &Position,
    close_price: f64,
    reason:      ExitReason,
) -> anyhow::Result<CloseOutcome> {
    let fill = ClosedFill::compute(position, close_price, reason);

    let result = sqlx::query(
        r#"
        UPDATE positions
        SET status               = 'CLOSED',
            exit_price           = $1,
            exit_reason          = $2,
            realized_pnl         = $3,
            realized_pnl_percent = $4,
            result               = $5,
            closed_at            = $6,
            updated_at           = now()
        WHERE id = $7 AND status = 'OPEN'
        "#,
    )
    .bind(fill.exit_price)
    .bind(fill.exit_reason.as_str())
    .bind(fill.realized_pnl)
    .bind(fill.realized_pnl_pct)
    .bind(fill.result.as_str())
    .bind(fill.closed_at)
    .bind(position.id)
    .execute(pool)
    .await
    .context("close_position update failed")?;

    Ok(interpret_close(result.rows_affected(), fill))
}

/// Maps the affected-row count of the conditional UPDATE onto the
/// at-most-once contract. Kept separate so the race semantics are unit-testable.
fn interpret_close(rows_affected: u64, fill: ClosedFill) -> CloseOutcome {
    if rows_affected == 0 {
        CloseOutcome::AlreadyClosed
    } else {
        CloseOutcome::Closed(fill)
    }
}

// ─── Notification Endpoints ───────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct EndpointRow {
    user_id:  String,
    token:    String,
    platform: String,
}

/// Active endpoints of one user, deduplicated by token (multi-device users
/// may register the same token through more than one path).
pub async fn list_endpoints(
    pool:    &PgPool,
    user_id: &str,
) -> anyhow::Result<Vec<NotificationEndpoint>> {
    let rows: Vec<EndpointRow> = sqlx::query_as(
        r#"
        SELECT user_id, token, platform
        FROM notification_endpoints
        WHERE user_id = $1 AND active
        ORDER BY updated_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("list_endpoints failed")?;

    let mut seen = HashSet::new();
    let endpoints = rows
        .into_iter()
        .filter(|r| seen.insert(r.token.clone()))
        .map(|r| NotificationEndpoint {
            user_id:  r.user_id,
            token:    r.token,
            platform: Platform::parse(&r.platform),
            active:   true,
        })
        .collect();

    Ok(endpoints)
}

/// Register (or re-activate) a device token. Classification happens **here**,
/// once, and the platform tag is persisted — the send path trusts the tag.
pub async fn register_endpoint(
    pool:          &PgPool,
    user_id:       &str,
    token:         &str,
    platform_hint: Option<&str>,
) -> anyhow::Result<Platform> {
    let platform = classify_token(token, platform_hint);

    sqlx::query(
        r#"
        INSERT INTO notification_endpoints (user_id, token, platform, active)
        VALUES ($1, $2, $3, TRUE)
        ON CONFLICT (token) DO UPDATE SET
          user_id    = EXCLUDED.user_id,
          platform   = EXCLUDED.platform,
          active     = TRUE,
          updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(token)
    .bind(platform.as_str())
    .execute(pool)
    .await
    .context("register_endpoint failed")?;

    Ok(platform)
}

/// Soft-delete a token the provider reported as gone (APNs 410 /
/// FCM UNREGISTERED). Future fan-outs stop touching it.
pub async fn deactivate_endpoint(pool: &PgPool, token: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE notification_endpoints SET active = FALSE, updated_at = now() WHERE token = $1",
    )
    .bind(token)
    .execute(pool)
    .await
    .context("deactivate_endpoint failed")?;

    Ok(())
}

// ─── Delivery Audit Log ───────────────────────────────────────────────────────

/// Append one audit row per delivery attempt. Best-effort alerting still
/// leaves a durable trace of what was tried and why it failed.
pub async fn insert_delivery(pool: &PgPool, attempt: &DeliveryAttempt) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO delivery_log
          (user_id, event_type, channel, token_prefix, success, error, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&attempt.user_id)
    .bind(&attempt.event_type)
    .bind(attempt.channel.as_str())
    .bind(&attempt.token_prefix)
    .bind(attempt.success)
    .bind(&attempt.error)
    .bind(attempt.created_at)
    .execute(pool)
    .await
    .context("insert_delivery failed")?;

    Ok(())
}

#[derive(sqlx::FromRow, serde::Serialize)]
pub struct DeliveryLogRow {
    pub user_id:      String,
    pub event_type:   String,
    pub channel:      String,
    pub token_prefix: String,
    pub success:      bool,
    pub error:        Option<String>,
    pub created_at:   DateTime<Utc>,
}

/// Most recent audit rows for one user (dashboard / debugging).
pub async fn recent_deliveries(
    pool:    &PgPool,
    user_id: &str,
    limit:   i64,
) -> anyhow::Result<Vec<DeliveryLogRow>> {
    let rows = sqlx::query_as(
        r#"
        SELECT user_id, event_type, channel, token_prefix, success, error, created_at
        FROM delivery_log
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit.clamp(1, 200))
    .fetch_all(pool)
    .await
    .context("recent_deliveries failed")?;

    Ok(rows)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TradeResult};

    fn sample_fill() -> ClosedFill {
        let position = Position {
            id:          Uuid::new_v4(),
            user_id:     "u".into(),
            symbol:      "BTCUSDT".into(),
            direction:   Direction::Long,
            entry_price: 100.0,
            quantity:    2.0,
            margin:      20.0,
            leverage:    10.0,
            stop_loss:   Some(95.0),
            take_profit: Some(110.0),
            status:      PositionStatus::Open,
        };
        ClosedFill::compute(&position, 110.0, ExitReason::TakeProfit)
    }

    #[test]
    fn test_zero_rows_means_already_closed() {
        // Two concurrent closers: the loser sees rows_affected = 0 and must
        // not report the close (or notify) a second time.
        match interpret_close(0, sample_fill()) {
            CloseOutcome::AlreadyClosed => {}
            CloseOutcome::Closed(_) => panic!("loser of the race must observe AlreadyClosed"),
        }
    }

    #[test]
    fn test_one_row_means_this_caller_closed() {
        match interpret_close(1, sample_fill()) {
            CloseOutcome::Closed(fill) => {
                assert_eq!(fill.realized_pnl, 20.0);
                assert_eq!(fill.result, TradeResult::Win);
            }
            CloseOutcome::AlreadyClosed => panic!("winner of the race must observe Closed"),
        }
    }
}
