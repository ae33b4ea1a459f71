//! # engine
//!
//! The monitor core: price snapshot → pure evaluation → guarded close.

pub mod evaluator;
pub mod monitor;
pub mod price_feed;
