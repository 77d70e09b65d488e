//! Admission control algorithms.
//!
//! Four independent limiters share nothing but the [`Limiter`] trait:
//!
//! - [`TokenBucket`]: tokens refill at a fixed rate up to a burst ceiling
//! - [`LeakyBucket`]: callers queue and are served at a fixed rate
//! - [`FixedWindow`]: a counter reset on a periodic tick
//! - [`SlidingWindow`]: a log of admissions over a trailing window

mod backend;
mod fixed_window;
mod leaky_bucket;
mod settings;
mod sliding_window;
mod token_bucket;

pub use backend::{Algorithm, Limiter};
pub use fixed_window::FixedWindow;
pub use leaky_bucket::LeakyBucket;
pub use settings::{
    FixedWindowSettings, LeakyBucketSettings, LimiterSettings, LimiterSpec,
    SlidingWindowSettings, TokenBucketSettings,
};
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;
