//! Fixed window limiter.
//!
//! Admissions are counted against `capacity` and a background task zeroes
//! the count every `window`, on a schedule anchored at construction rather
//! than at the first request. Two full bursts can therefore land on either
//! side of a reset within a short real-time span; that is inherent to the
//! algorithm.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::backend::{Algorithm, Limiter};
use super::settings::FixedWindowSettings;
use crate::error::{RatekeeperError, Result};

/// A fixed window counter with a periodic reset task.
#[derive(Debug)]
pub struct FixedWindow {
    capacity: u64,
    window: Duration,
    counter: Arc<Mutex<u64>>,
    resetter: JoinHandle<()>,
}

impl FixedWindow {
    /// Create a fixed window and start its reset task.
    ///
    /// The first reset happens one `window` after this call. Fails with
    /// [`RatekeeperError::NoRuntime`] outside a tokio runtime.
    pub fn new(settings: FixedWindowSettings) -> Result<Self> {
        settings.validate()?;
        let runtime =
            Handle::try_current().map_err(|_| RatekeeperError::NoRuntime("fixed_window"))?;

        let first_reset = Instant::now()
            .checked_add(settings.window)
            .ok_or_else(|| RatekeeperError::invalid("fixed_window", "window", "too large"))?;
        let counter = Arc::new(Mutex::new(0));
        let resetter = runtime.spawn(reset_every(counter.clone(), first_reset, settings.window));

        debug!(
            limiter = "fixed_window",
            capacity = settings.capacity,
            window_ms = settings.window.as_millis() as u64,
            "Creating fixed window"
        );

        Ok(Self {
            capacity: settings.capacity,
            window: settings.window,
            counter,
            resetter,
        })
    }

    /// Count one admission if the current window still has room.
    pub fn allow(&self) -> bool {
        let mut counter = self.counter.lock();
        if *counter >= self.capacity {
            trace!(
                limiter = "fixed_window",
                capacity = self.capacity,
                "Rejected, window full"
            );
            return false;
        }

        *counter += 1;
        true
    }

    /// Admissions counted in the current window.
    pub fn count(&self) -> u64 {
        *self.counter.lock()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Drop for FixedWindow {
    fn drop(&mut self) {
        self.resetter.abort();
    }
}

async fn reset_every(counter: Arc<Mutex<u64>>, first_reset: Instant, window: Duration) {
    let mut ticker = interval_at(first_reset, window);
    // Keep boundaries on the construction-anchored grid after a stall
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let previous = std::mem::take(&mut *counter.lock());
        trace!(limiter = "fixed_window", previous, "Window reset");
    }
}

#[async_trait]
impl Limiter for FixedWindow {
    async fn allow(&self) -> bool {
        FixedWindow::allow(self)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn fixed(capacity: u64, window: Duration) -> FixedWindow {
        FixedWindow::new(
            FixedWindowSettings::default()
                .with_capacity(capacity)
                .with_window(window),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_runtime() {
        let err = FixedWindow::new(FixedWindowSettings::default()).unwrap_err();
        assert!(matches!(err, RatekeeperError::NoRuntime("fixed_window")));
    }

    #[tokio::test]
    async fn test_rejects_unrepresentable_window() {
        let settings = FixedWindowSettings::default().with_window(Duration::MAX);
        settings.validate().unwrap();

        let err = FixedWindow::new(settings).unwrap_err();
        assert!(matches!(
            err,
            RatekeeperError::InvalidSetting {
                limiter: "fixed_window",
                setting: "window",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_limit() {
        let window = fixed(10, Duration::from_secs(5));

        for i in 0..10 {
            assert!(window.allow(), "Request {} should be allowed", i + 1);
        }
        assert!(!window.allow());
        assert_eq!(window.count(), 10);
        assert_eq!(window.capacity(), 10);
        assert_eq!(window.window(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_window() {
        let window = fixed(10, Duration::from_secs(5));

        for _ in 0..10 {
            window.allow();
        }
        assert!(!window.allow());

        tokio::time::sleep(Duration::from_millis(5_001)).await;

        assert_eq!(window.count(), 0);
        assert!(window.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_boundaries_anchored_at_construction() {
        let window = fixed(3, Duration::from_secs(5));

        // First requests arrive 4s in; the reset still comes at 5s
        tokio::time::sleep(Duration::from_secs(4)).await;
        for _ in 0..3 {
            assert!(window.allow());
        }
        assert!(!window.allow());

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert!(window.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_across_boundary() {
        let window = fixed(5, Duration::from_secs(5));
        let mut admitted = 0;

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        for _ in 0..5 {
            if window.allow() {
                admitted += 1;
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        for _ in 0..5 {
            if window.allow() {
                admitted += 1;
            }
        }

        // Twice the capacity within 200ms
        assert_eq!(admitted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resets_keep_period() {
        let window = fixed(1, Duration::from_secs(1));

        // Check mid-window so no check coincides with a reset tick
        tokio::time::sleep(Duration::from_millis(500)).await;
        for _ in 0..5 {
            assert!(window.allow());
            assert!(!window.allow());
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_respect_capacity() {
        let window = Arc::new(fixed(25, Duration::from_secs(3600)));
        let admitted = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let window = window.clone();
                let admitted = admitted.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        if window.allow() {
                            admitted.fetch_add(1, Ordering::Relaxed);
                        }
                        assert!(window.count() <= window.capacity());
                    }
                })
            })
            .collect();

        for handle in futures::future::join_all(handles).await {
            handle.unwrap();
        }

        assert_eq!(admitted.load(Ordering::Relaxed), 25);
        assert_eq!(window.count(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_trait() {
        let window = fixed(1, Duration::from_secs(5));
        let limiter: &dyn Limiter = &window;
        assert_eq!(limiter.algorithm(), Algorithm::FixedWindow);
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
    }
}
