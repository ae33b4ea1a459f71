//! # routes
//!
//! Axum handlers: the scheduler-facing monitor trigger and the notification
//! service surface.

pub mod monitor;
pub mod notify;
