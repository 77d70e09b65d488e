//! Limiter settings and construction.
//!
//! Each algorithm has a settings struct carrying its defaults. Settings are
//! adjusted with `with_*` methods, applied in call order, and checked by
//! `validate` before a limiter is built. The same structs deserialize from
//! the service configuration, where a [`LimiterSpec`] names one limiter and
//! tags it with its algorithm.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::backend::{Algorithm, Limiter};
use super::{FixedWindow, LeakyBucket, SlidingWindow, TokenBucket};
use crate::error::{RatekeeperError, Result};

const DEFAULT_TOKEN_BURST: u64 = 100;
const DEFAULT_TOKEN_RATE: f64 = 1.0;
const DEFAULT_LEAKY_CAPACITY: usize = 100;
const DEFAULT_LEAKY_RATE: f64 = 10.0;
const DEFAULT_FIXED_CAPACITY: u64 = 10;
const DEFAULT_SLIDING_RATE: f64 = 2.0;
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Token bucket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketSettings {
    /// Maximum number of tokens the bucket holds
    #[serde(default = "default_token_burst")]
    pub burst: u64,
    /// Tokens added per second
    #[serde(default = "default_token_rate")]
    pub rate: f64,
}

impl Default for TokenBucketSettings {
    fn default() -> Self {
        Self {
            burst: default_token_burst(),
            rate: default_token_rate(),
        }
    }
}

impl TokenBucketSettings {
    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive_count("token_bucket", "burst", self.burst)?;
        positive_rate("token_bucket", self.rate)
    }
}

/// Leaky bucket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakyBucketSettings {
    /// Maximum number of callers queued or being served
    #[serde(default = "default_leaky_capacity")]
    pub capacity: usize,
    /// Callers served per second
    #[serde(default = "default_leaky_rate")]
    pub rate: f64,
}

impl Default for LeakyBucketSettings {
    fn default() -> Self {
        Self {
            capacity: default_leaky_capacity(),
            rate: default_leaky_rate(),
        }
    }
}

impl LeakyBucketSettings {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Pause between two served callers, never shorter than one microsecond.
    pub fn service_interval(&self) -> Duration {
        let micros = (1_000_000.0 / self.rate) as u64;
        Duration::from_micros(micros.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        positive_count("leaky_bucket", "capacity", self.capacity as u64)?;
        if self.capacity > Semaphore::MAX_PERMITS {
            return Err(RatekeeperError::invalid(
                "leaky_bucket",
                "capacity",
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }
        positive_rate("leaky_bucket", self.rate)
    }
}

/// Fixed window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedWindowSettings {
    /// Maximum admissions per window
    #[serde(default = "default_fixed_capacity")]
    pub capacity: u64,
    /// Window length
    #[serde(rename = "window_ms", with = "millis", default = "default_window")]
    pub window: Duration,
}

impl Default for FixedWindowSettings {
    fn default() -> Self {
        Self {
            capacity: default_fixed_capacity(),
            window: default_window(),
        }
    }
}

impl FixedWindowSettings {
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive_count("fixed_window", "capacity", self.capacity)?;
        positive_window("fixed_window", self.window)
    }
}

/// Sliding window settings.
///
/// The admission limit is not stored; it is derived from `rate` and `window`
/// when the limiter is built, so the order of `with_rate` and `with_window`
/// does not matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlidingWindowSettings {
    /// Window length
    #[serde(rename = "window_ms", with = "millis", default = "default_window")]
    pub window: Duration,
    /// Requests per second averaged over the window
    #[serde(default = "default_sliding_rate")]
    pub rate: f64,
}

impl Default for SlidingWindowSettings {
    fn default() -> Self {
        Self {
            window: default_window(),
            rate: default_sliding_rate(),
        }
    }
}

impl SlidingWindowSettings {
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Maximum admissions within any trailing window: `floor(rate * window)`.
    pub fn limit(&self) -> usize {
        (self.rate * self.window.as_secs_f64()).floor() as usize
    }

    pub fn validate(&self) -> Result<()> {
        positive_window("sliding_window", self.window)?;
        positive_rate("sliding_window", self.rate)?;
        if self.limit() == 0 {
            return Err(RatekeeperError::invalid(
                "sliding_window",
                "rate",
                format!(
                    "{} per second over {:?} admits no requests",
                    self.rate, self.window
                ),
            ));
        }
        Ok(())
    }
}

/// Algorithm-tagged settings for one limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterSettings {
    TokenBucket(TokenBucketSettings),
    LeakyBucket(LeakyBucketSettings),
    FixedWindow(FixedWindowSettings),
    SlidingWindow(SlidingWindowSettings),
}

impl LimiterSettings {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            LimiterSettings::TokenBucket(_) => Algorithm::TokenBucket,
            LimiterSettings::LeakyBucket(_) => Algorithm::LeakyBucket,
            LimiterSettings::FixedWindow(_) => Algorithm::FixedWindow,
            LimiterSettings::SlidingWindow(_) => Algorithm::SlidingWindow,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            LimiterSettings::TokenBucket(s) => s.validate(),
            LimiterSettings::LeakyBucket(s) => s.validate(),
            LimiterSettings::FixedWindow(s) => s.validate(),
            LimiterSettings::SlidingWindow(s) => s.validate(),
        }
    }

    /// Build the limiter described by these settings.
    ///
    /// Leaky buckets and fixed windows spawn their background task here, so
    /// this must run inside a tokio runtime for those two algorithms.
    pub fn build(&self) -> Result<Arc<dyn Limiter>> {
        let limiter: Arc<dyn Limiter> = match self {
            LimiterSettings::TokenBucket(s) => Arc::new(TokenBucket::new(s.clone())?),
            LimiterSettings::LeakyBucket(s) => Arc::new(LeakyBucket::new(s.clone())?),
            LimiterSettings::FixedWindow(s) => Arc::new(FixedWindow::new(s.clone())?),
            LimiterSettings::SlidingWindow(s) => Arc::new(SlidingWindow::new(s.clone())?),
        };
        Ok(limiter)
    }
}

/// A named limiter as written in the service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterSpec {
    /// Route name the dispatcher exposes this limiter under
    pub name: String,
    #[serde(flatten)]
    pub settings: LimiterSettings,
}

impl LimiterSpec {
    pub fn new(name: impl Into<String>, settings: LimiterSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }
}

fn positive_count(limiter: &'static str, setting: &'static str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(RatekeeperError::invalid(limiter, setting, "must be at least 1"));
    }
    Ok(())
}

fn positive_rate(limiter: &'static str, rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(RatekeeperError::invalid(
            limiter,
            "rate",
            format!("must be a positive finite number, got {}", rate),
        ));
    }
    Ok(())
}

fn positive_window(limiter: &'static str, window: Duration) -> Result<()> {
    if window.is_zero() {
        return Err(RatekeeperError::invalid(limiter, "window", "must be non-zero"));
    }
    Ok(())
}

fn default_token_burst() -> u64 {
    DEFAULT_TOKEN_BURST
}

fn default_token_rate() -> f64 {
    DEFAULT_TOKEN_RATE
}

fn default_leaky_capacity() -> usize {
    DEFAULT_LEAKY_CAPACITY
}

fn default_leaky_rate() -> f64 {
    DEFAULT_LEAKY_RATE
}

fn default_fixed_capacity() -> u64 {
    DEFAULT_FIXED_CAPACITY
}

fn default_sliding_rate() -> f64 {
    DEFAULT_SLIDING_RATE
}

fn default_window() -> Duration {
    DEFAULT_WINDOW
}

/// Durations written as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
