//! Admission control for concurrent probes within one batch run.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{Result, SnifferError};

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Held for the duration of one probe. Dropping it frees the slot.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    pub acquired_at: DateTime<Utc>,
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("acquired_at", &self.acquired_at)
            .finish_non_exhaustive()
    }
}

/// Counting gate limiting in-flight probes.
///
/// Waiters are served in FIFO order, so dispatch keeps submission order.
#[derive(Clone)]
pub struct AdmissionController {
    limit: usize,
    semaphore: Arc<Semaphore>,
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (in_flight, limit) = self.utilization();
        f.debug_struct("AdmissionController")
            .field("in_flight", &in_flight)
            .field("limit", &limit)
            .finish()
    }
}

impl AdmissionController {
    /// Limits below one are coerced to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SnifferError::Internal("admission gate closed".into()))?;
        Ok(AdmissionPermit {
            _permit: permit,
            acquired_at: Utc::now(),
        })
    }

    pub fn try_acquire(&self) -> Result<Option<AdmissionPermit>> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(AdmissionPermit {
                _permit: permit,
                acquired_at: Utc::now(),
            })),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => {
                Err(SnifferError::Internal("admission gate closed".into()))
            }
        }
    }

    /// `(in_flight, limit)`.
    pub fn utilization(&self) -> (usize, usize) {
        let available = self.semaphore.available_permits();
        (self.limit.saturating_sub(available), self.limit)
    }

    pub fn has_capacity(&self) -> bool {
        self.semaphore.available_permits() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn zero_limit_is_coerced_to_one() {
        let gate = AdmissionController::new(0);
        assert_eq!(gate.limit(), 1);
        assert_eq!(gate.utilization(), (0, 1));
    }

    #[tokio::test]
    async fn permits_are_released_on_drop() {
        let gate = AdmissionController::new(2);
        let first = gate.acquire().await.expect("first permit");
        let _second = gate.acquire().await.expect("second permit");
        assert_eq!(gate.utilization(), (2, 2));
        assert!(gate.try_acquire().expect("try").is_none());

        drop(first);
        assert!(gate.has_capacity());
        assert!(gate.try_acquire().expect("try").is_some());
    }

    #[tokio::test]
    async fn never_exceeds_limit_under_contention() {
        let gate = AdmissionController::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let permit = gate.acquire().await.expect("permit");
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.utilization(), (0, 3));
    }
}
