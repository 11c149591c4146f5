//! Core library for the rental marketplace transaction lifecycle.
//!
//! The interesting machinery lives in [`workflows::rental`]: housing-request
//! intake and quotas, match brokering, lease tracking, booking creation with
//! rent scheduling, and the post-booking modification workflow. Everything
//! else here is the service shell around it.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
