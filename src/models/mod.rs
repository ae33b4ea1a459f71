//! # models
//!
//! Domain types shared across the monitor and the push pipeline.

pub mod notification;
pub mod position;

pub use notification::{
    classify_token, channel_for, token_prefix, AttemptResult, Channel, DeliveryAttempt,
    NotificationEndpoint, NotifyReport, NotifyRequest, Platform,
};
pub use position::{ClosedFill, Direction, ExitReason, Position, PositionStatus, TradeResult};
