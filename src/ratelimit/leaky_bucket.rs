//! Leaky bucket limiter.
//!
//! Callers join a bounded FIFO queue and wait there until a single drainer
//! task serves them, one per service interval. A caller that finds the
//! bucket full is rejected at once; a caller that gets in is admitted only
//! once served, so admission latency grows with queue depth.
//!
//! The bound covers every outstanding caller, queued or served but not yet
//! resumed. Each caller holds a semaphore permit from the moment it joins
//! until `allow` returns.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use super::backend::{Algorithm, Limiter};
use super::settings::LeakyBucketSettings;
use crate::error::{RatekeeperError, Result};

/// One caller's place in the queue. The drainer fires it to admit the caller.
type Ticket = oneshot::Sender<()>;

/// A leaky bucket served by a dedicated drainer task.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: usize,
    rate: f64,
    slots: Semaphore,
    queue: mpsc::Sender<Ticket>,
    drainer: JoinHandle<()>,
}

impl LeakyBucket {
    /// Create a leaky bucket and start its drainer.
    ///
    /// Fails with [`RatekeeperError::NoRuntime`] when called outside a tokio
    /// runtime, since the drainer must be running before any caller queues.
    pub fn new(settings: LeakyBucketSettings) -> Result<Self> {
        settings.validate()?;
        let runtime =
            Handle::try_current().map_err(|_| RatekeeperError::NoRuntime("leaky_bucket"))?;

        let interval = settings.service_interval();
        let (queue, tickets) = mpsc::channel(settings.capacity);
        let drainer = runtime.spawn(drain(tickets, interval));

        debug!(
            limiter = "leaky_bucket",
            capacity = settings.capacity,
            rate = settings.rate,
            interval_us = interval.as_micros() as u64,
            "Creating leaky bucket"
        );

        Ok(Self {
            capacity: settings.capacity,
            rate: settings.rate,
            slots: Semaphore::new(settings.capacity),
            queue,
            drainer,
        })
    }

    /// Queue up and wait to be served.
    ///
    /// Returns `false` immediately if the bucket is full. Otherwise resolves
    /// to `true` once the drainer reaches this caller. Dropping the future
    /// gives up the place in the queue.
    pub async fn allow(&self) -> bool {
        let Some((_slot, served)) = self.enqueue() else {
            return false;
        };

        served.await.is_ok()
    }

    /// Like [`allow`](Self::allow), but gives up and returns `false` if
    /// `cancel` completes before this caller is served.
    pub async fn allow_or_cancel<F>(&self, cancel: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let Some((_slot, served)) = self.enqueue() else {
            return false;
        };

        tokio::select! {
            biased;
            result = served => result.is_ok(),
            _ = cancel => {
                debug!(limiter = "leaky_bucket", "Wait cancelled before service");
                false
            }
        }
    }

    /// Like [`allow`](Self::allow), but waits at most `timeout`.
    pub async fn allow_timeout(&self, timeout: Duration) -> bool {
        self.allow_or_cancel(tokio::time::sleep(timeout)).await
    }

    /// Callers currently queued or being served.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn enqueue(&self) -> Option<(SemaphorePermit<'_>, oneshot::Receiver<()>)> {
        let Ok(slot) = self.slots.try_acquire() else {
            trace!(
                limiter = "leaky_bucket",
                capacity = self.capacity,
                "Rejected, bucket full"
            );
            return None;
        };

        let (ticket, served) = oneshot::channel();
        match self.queue.try_send(ticket) {
            Ok(()) => Some((slot, served)),
            // Abandoned tickets still occupy the queue until the drainer
            // discards them.
            Err(TrySendError::Full(_)) => {
                trace!(
                    limiter = "leaky_bucket",
                    "Rejected, queue holds abandoned tickets"
                );
                None
            }
            Err(TrySendError::Closed(_)) => {
                error!(limiter = "leaky_bucket", "Drainer is not running");
                None
            }
        }
    }
}

impl Drop for LeakyBucket {
    fn drop(&mut self) {
        self.drainer.abort();
    }
}

/// Serve tickets in FIFO order, pausing `interval` after each one served.
async fn drain(mut tickets: mpsc::Receiver<Ticket>, interval: Duration) {
    debug!(limiter = "leaky_bucket", "Drainer started");

    while let Some(ticket) = tickets.recv().await {
        if ticket.send(()).is_err() {
            trace!(limiter = "leaky_bucket", "Discarding abandoned ticket");
            continue;
        }

        tokio::time::sleep(interval).await;
    }

    debug!(limiter = "leaky_bucket", "Drainer stopped");
}

#[async_trait]
impl Limiter for LeakyBucket {
    async fn allow(&self) -> bool {
        LeakyBucket::allow(self).await
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LeakyBucket
    }
}
