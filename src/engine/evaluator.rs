//! # engine::evaluator
//!
//! **Position Evaluator** — pure decision logic, no I/O.
//!
//! ## Check order (per position, first match wins)
//! ```text
//! 1. Stop-loss    — LONG: price ≤ SL, SHORT: price ≥ SL
//! 2. Take-profit  — LONG: price ≥ TP, SHORT: price ≤ TP
//! 3. Liquidation  — LONG: price ≤ liq, SHORT: price ≥ liq
//! ```
//! The order is deliberate and preserved: if a single tick gaps through both
//! the stop-loss and the liquidation price, the position closes as STOP_LOSS.
//! Whether liquidation should win in that case is an open product question.

use crate::models::{Direction, ExitReason, Position};

// ─── Liquidation Price ────────────────────────────────────────────────────────

/// Price at which a leveraged position's margin is exhausted.
///
/// LONG:  `entry * (1 - 1/leverage + mmr)`
/// SHORT: `entry * (1 + 1/leverage - mmr)`
pub fn liquidation_price(
    direction: Direction,
    entry_price: f64,
    leverage: f64,
    maintenance_margin_rate: f64,
) -> f64 {
    let lev = leverage.max(1.0);
    match direction {
        Direction::Long  => entry_price * (1.0 - 1.0 / lev + maintenance_margin_rate),
        Direction::Short => entry_price * (1.0 + 1.0 / lev - maintenance_margin_rate),
    }
}

// ─── Trigger Evaluation ───────────────────────────────────────────────────────

/// Judge one position against one snapshot price.
///
/// Returns the first matching trigger, or `None` when the position survives
/// the tick. Thresholds left unset simply don't fire.
pub fn evaluate(
    position: &Position,
    price: f64,
    maintenance_margin_rate: f64,
) -> Option<ExitReason> {
    let long = position.is_long();

    // ── [1] Stop-loss ─────────────────────────────────────────────────────────
    if let Some(sl) = position.stop_loss {
        let hit = if long { price <= sl } else { price >= sl };
        if hit {
            return Some(ExitReason::StopLoss);
        }
    }

    // ── [2] Take-profit ───────────────────────────────────────────────────────
    if let Some(tp) = position.take_profit {
        let hit = if long { price >= tp } else { price <= tp };
        if hit {
            return Some(ExitReason::TakeProfit);
        }
    }

    // ── [3] Liquidation ───────────────────────────────────────────────────────
    let liq = liquidation_price(
        position.direction,
        position.entry_price,
        position.leverage,
        maintenance_margin_rate,
    );
    let hit = if long { price <= liq } else { price >= liq };
    if hit {
        return Some(ExitReason::Liquidation);
    }

    None
}

// ─── Tests ────────────────────────────────────────────────────────────────────
