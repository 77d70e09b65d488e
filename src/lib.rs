//! Ratekeeper - in-process admission control
//!
//! This crate implements four interchangeable rate limiters (token bucket,
//! leaky bucket, fixed window and sliding window) behind one `Limiter`
//! trait, plus a small HTTP front end that routes requests to limiters by
//! name.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ratelimit;
