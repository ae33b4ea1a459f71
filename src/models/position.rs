//! # models::position
//!
//! Simulated (paper) trading positions and their close records.
//!
//! A position is created by the out-of-scope "open trade" flow and mutated
//! exactly once — by the guarded close in [`crate::db::close_position`].
//! While OPEN, every exit field is unset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Direction ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long  => "LONG",
            Direction::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LONG"  => Some(Direction::Long),
            "SHORT" => Some(Direction::Short),
            _ => None,
        }
    }
}

// ─── PositionStatus ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

// ─── ExitReason ───────────────────────────────────────────────────────────────

/// Why the monitor force-closed a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Liquidation,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit  => "TAKE_PROFIT",
            ExitReason::StopLoss    => "STOP_LOSS",
            ExitReason::Liquidation => "LIQUIDATION",
        }
    }
}

// ─── TradeResult ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeResult {
    Win,
    Loss,
}

impl TradeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeResult::Win  => "WIN",
            TradeResult::Loss => "LOSS",
        }
    }
}

// ─── Position ─────────────────────────────────────────────────────────────────

/// An open simulated position as loaded for one monitor pass.
///
/// Invariant: status transitions OPEN → CLOSED at most once; the conditional
/// UPDATE in the store is the only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id:          Uuid,
    pub user_id:     String,
    pub symbol:      String,
    pub direction:   Direction,
    pub entry_price: f64,
    pub quantity:    f64,
    pub margin:      f64,
    /// Leverage multiplier, always ≥ 1.
    pub leverage:    f64,
    pub stop_loss:   Option<f64>,
    pub take_profit: Option<f64>,
    pub status:      PositionStatus,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }
}

// ─── ClosedFill ───────────────────────────────────────────────────────────────

/// The computed outcome of a guarded close — what gets written back to the
/// row and echoed into the user notification.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedFill {
    pub exit_price:       f64,
    pub exit_reason:      ExitReason,
    pub realized_pnl:     f64,
    /// ROE — realized PnL over margin, in percent.
    pub realized_pnl_pct: f64,
    pub result:           TradeResult,
    pub closed_at:        DateTime<Utc>,
}

impl ClosedFill {
    /// PnL math for a leveraged paper position:
    /// `diff = long ? close - entry : entry - close`, `pnl = diff * qty`,
    /// `roe = pnl / margin * 100`.
    pub fn compute(position: &Position, close_price: f64, reason: ExitReason) -> Self {
        let price_diff = if position.is_long() {
            close_price - position.entry_price
        } else {
            position.entry_price - close_price
        };

        let pnl = price_diff * position.quantity;
        let roe = if position.margin > 0.0 {
            pnl / position.margin * 100.0
        } else {
            0.0
        };

        Self {
            exit_price:       close_price,
            exit_reason:      reason,
            realized_pnl:     pnl,
            realized_pnl_pct: roe,
            result:           if pnl >= 0.0 { TradeResult::Win } else { TradeResult::Loss },
            closed_at:        Utc::now(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_position(direction: Direction) -> Position {
        Position {
            id:          Uuid::new_v4(),
            user_id:     "user-1".to_string(),
            symbol:      "BTCUSDT".to_string(),
            direction,
            entry_price: 100.0,
            quantity:    2.0,
            margin:      20.0,
            leverage:    10.0,
            stop_loss:   Some(95.0),
            take_profit: Some(110.0),
            status:      PositionStatus::Open,
        }
    }

    #[test]
    fn test_long_win_pnl_and_roe() {
        let fill = ClosedFill::compute(&make_position(Direction::Long), 110.0, ExitReason::TakeProfit);
        assert_eq!(fill.realized_pnl, 20.0);
        assert_eq!(fill.realized_pnl_pct, 100.0);
        assert_eq!(fill.result, TradeResult::Win);
    }

    #[test]
    fn test_long_loss() {
        let fill = ClosedFill::compute(&make_position(Direction::Long), 95.0, ExitReason::StopLoss);
        assert_eq!(fill.realized_pnl, -10.0);
        assert_eq!(fill.result, TradeResult::Loss);
    }

    #[test]
    fn test_short_pnl_inverts_diff() {
        let fill = ClosedFill::compute(&make_position(Direction::Short), 90.0, ExitReason::TakeProfit);
        assert_eq!(fill.realized_pnl, 20.0);
        assert_eq!(fill.result, TradeResult::Win);
    }

    #[test]
    fn test_breakeven_counts_as_win() {
        // pnl == 0 → WIN (ties go to the user)
        let fill = ClosedFill::compute(&make_position(Direction::Long), 100.0, ExitReason::StopLoss);
        assert_eq!(fill.realized_pnl, 0.0);
        assert_eq!(fill.result, TradeResult::Win);
    }

    #[test]
    fn test_zero_margin_does_not_divide() {
        let mut pos = make_position(Direction::Long);
        pos.margin = 0.0;
        let fill = ClosedFill::compute(&pos, 110.0, ExitReason::TakeProfit);
        assert_eq!(fill.realized_pnl_pct, 0.0);
    }
}
