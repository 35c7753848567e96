//! Two-tier admission control.
//!
//! ```text
//!   request ──► accept gate (try, never waits) ──full──► 429 Rejected
//!                   │
//!                   ▼
//!             verify + parse
//!                   │
//!                   ▼
//!          processing gate (waits) ──timeout/drop──► 499 Canceled
//!                   │
//!                   ▼
//!        load source + decode + transform
//! ```
//!
//! The accept gate bounds requests in flight. The processing gate bounds the
//! expensive part, origin I/O and CPU alike, inside those.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use crate::error::ServeError;
use crate::stats::Stats;

/// Both admission gates plus the counters they update.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    accept: Arc<Semaphore>,
    processing: Arc<Semaphore>,
    queue_timeout: Option<Duration>,
    stats: Arc<Stats>,
}

/// Held for the whole lifetime of an accepted request.
///
/// Keeps the in-flight gauge up to date and releases the accept slot on drop.
#[derive(Debug)]
pub struct AcceptGuard {
    _permit: OwnedSemaphorePermit,
    stats: Arc<Stats>,
}

impl Drop for AcceptGuard {
    fn drop(&mut self) {
        self.stats.leave();
    }
}

impl AdmissionController {
    /// Create a controller.
    ///
    /// A `queue_timeout` of `None` waits for a processing slot indefinitely.
    pub fn new(
        max_clients: usize,
        concurrency: usize,
        queue_timeout: Option<Duration>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            accept: Arc::new(Semaphore::new(max_clients)),
            processing: Arc::new(Semaphore::new(concurrency)),
            queue_timeout,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn accept_available(&self) -> usize {
        self.accept.available_permits()
    }

    pub fn processing_available(&self) -> usize {
        self.processing.available_permits()
    }

    /// Take an accept slot without waiting.
    ///
    /// # Errors
    ///
    /// `ServeError::Rejected` when every slot is taken; the rejection counter
    /// is incremented once per call.
    pub fn try_accept(&self) -> Result<AcceptGuard, ServeError> {
        match self.accept.clone().try_acquire_owned() {
            Ok(permit) => {
                self.stats.enter();
                Ok(AcceptGuard {
                    _permit: permit,
                    stats: self.stats.clone(),
                })
            }
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                self.stats.record_rejected();
                Err(ServeError::Rejected)
            }
        }
    }

    /// Wait for a processing slot.
    ///
    /// Dropping the returned future abandons the wait without taking a slot.
    ///
    /// # Errors
    ///
    /// `ServeError::Canceled` when the queue timeout elapses first.
    pub async fn acquire_processing(&self) -> Result<OwnedSemaphorePermit, ServeError> {
        let acquire = self.processing.clone().acquire_owned();

        let result = match self.queue_timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(timeout_ms = limit.as_millis() as u64, "Processing queue timeout");
                    self.stats.record_canceled();
                    return Err(ServeError::Canceled);
                }
            },
            None => acquire.await,
        };

        result.map_err(|_| {
            self.stats.record_canceled();
            ServeError::Canceled
        })
    }
}
