//! Sliding window log limiter.
//!
//! Keeps the timestamp of every admission inside the trailing window and
//! admits while fewer than `limit` remain. All bookkeeping happens on the
//! calling path, so there is no background task and no boundary burst.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::backend::{Algorithm, Limiter};
use super::settings::SlidingWindowSettings;
use crate::error::Result;

/// Upper bound on history slots reserved up front; larger limits grow on demand.
const PREALLOCATED_ENTRIES: usize = 1024;

/// A sliding window over recent admission timestamps.
#[derive(Debug)]
pub struct SlidingWindow {
    window: Duration,
    limit: usize,
    /// Admission times, oldest first
    history: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(settings: SlidingWindowSettings) -> Result<Self> {
        settings.validate()?;
        let limit = settings.limit();

        debug!(
            limiter = "sliding_window",
            limit,
            window_ms = settings.window.as_millis() as u64,
            "Creating sliding window"
        );

        Ok(Self {
            window: settings.window,
            limit,
            history: Mutex::new(VecDeque::with_capacity(limit.min(PREALLOCATED_ENTRIES))),
        })
    }

    /// Admit if fewer than `limit` admissions fall within the trailing window.
    pub fn allow(&self) -> bool {
        let mut history = self.history.lock();
        let now = Instant::now();
        prune(&mut history, now, self.window);

        if history.len() >= self.limit {
            trace!(
                limiter = "sliding_window",
                limit = self.limit,
                "Rejected, window full"
            );
            return false;
        }

        history.push_back(now);
        true
    }

    /// Admissions still inside the trailing window.
    pub fn in_window(&self) -> usize {
        let mut history = self.history.lock();
        prune(&mut history, Instant::now(), self.window);
        history.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Drop expired entries from the front of `history`.
///
/// An entry expires once its age reaches `window`. Age saturates at zero, so
/// an entry stamped after `now` counts as fresh, and trimming stops at the
/// first fresh entry. Out-of-order stamps can only keep entries alive longer,
/// never admit more than `limit`.
fn prune(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = history.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        history.pop_front();
    }
}

#[async_trait]
impl Limiter for SlidingWindow {
    async fn allow(&self) -> bool {
        SlidingWindow::allow(self)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }
}
