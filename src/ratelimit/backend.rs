//! Limiter trait for abstracting over the four admission algorithms.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The admission algorithm backing a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    TokenBucket,
    LeakyBucket,
    FixedWindow,
    SlidingWindow,
}

impl Algorithm {
    /// The snake_case name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::LeakyBucket => "leaky_bucket",
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for admission controllers.
///
/// This trait abstracts over the four limiter implementations so a
/// dispatcher can hold any of them behind `Arc<dyn Limiter>`. Only the leaky
/// bucket ever suspends inside `allow`; the others answer immediately.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Decide whether one unit of work may proceed now.
    async fn allow(&self) -> bool;

    /// The algorithm this limiter implements.
    fn algorithm(&self) -> Algorithm;
}
