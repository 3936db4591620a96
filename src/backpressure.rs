//! Backpressure for the outbound frame queue.
//!
//! Every frame handed to the writer task holds one slot of a
//! [`BackpressureController`] through a [`BackpressureGuard`]. The slot is
//! returned when the frame is dropped: after it was written, or when the
//! writer shut down with frames still queued. Senders waiting for a slot
//! are woken as slots come back.
//!
//! # Configuration
//!
//! - `max_pending`: Maximum number of queued frames (default: 1024)
//! - Timeout: How long a sender waits for a free slot (default: 5s)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Result, StreamingError};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default backpressure timeout (how long to wait for space to become available).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Slots {
    pending: AtomicUsize,
    freed: Notify,
}

/// Counter of queued frames, shared between senders and the writer.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    slots: Arc<Slots>,
    max_pending: usize,
    timeout: Duration,
}

impl BackpressureController {
    /// Create a controller with the default timeout.
    pub fn new(max_pending: usize) -> Self {
        Self::with_timeout(max_pending, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(max_pending: usize, timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Slots {
                pending: AtomicUsize::new(0),
                freed: Notify::new(),
            }),
            max_pending: max_pending.max(1),
            timeout,
        }
    }

    /// Check if the queue is full.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pending_count() >= self.max_pending
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.slots.pending.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    fn try_acquire(&self) -> Option<BackpressureGuard> {
        self.slots
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_pending).then_some(current + 1)
            })
            .ok()
            .map(|_| BackpressureGuard {
                slots: self.slots.clone(),
            })
    }

    /// Take a slot without waiting.
    ///
    /// # Errors
    ///
    /// `BackpressureTimeout` if the queue is full.
    pub fn try_reserve(&self) -> Result<BackpressureGuard> {
        self.try_acquire().ok_or(StreamingError::BackpressureTimeout)
    }

    /// Take a slot, waiting up to the configured timeout for one to free up.
    ///
    /// # Errors
    ///
    /// `BackpressureTimeout` if no slot frees up in time.
    pub async fn reserve(&self) -> Result<BackpressureGuard> {
        let wait = async {
            loop {
                // Registered before the check so a release in between is not missed
                let freed = self.slots.freed.notified();
                if let Some(guard) = self.try_acquire() {
                    return guard;
                }
                freed.await;
            }
        };

        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| StreamingError::BackpressureTimeout)
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

/// One reserved slot, released on drop.
#[derive(Debug)]
pub struct BackpressureGuard {
    slots: Arc<Slots>,
}

impl Drop for BackpressureGuard {
    fn drop(&mut self) {
        self.slots.pending.fetch_sub(1, Ordering::Release);
        self.slots.freed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_fill_and_drain() {
        let slots = BackpressureController::new(3);
        assert_eq!(slots.max_pending(), 3);
        assert!(!slots.is_active());

        let mut held: Vec<_> = (0..3).map(|_| slots.try_reserve().unwrap()).collect();
        assert!(slots.is_active());
        assert!(matches!(
            slots.try_reserve(),
            Err(StreamingError::BackpressureTimeout)
        ));

        held.pop();
        assert_eq!(slots.pending_count(), 2);
        assert!(slots.try_reserve().is_ok());

        held.clear();
        assert_eq!(slots.pending_count(), 0);
    }

    #[test]
    fn test_zero_limit_still_admits_one() {
        let slots = BackpressureController::new(0);
        let _one = slots.try_reserve().unwrap();
        assert!(slots.try_reserve().is_err());
    }

    #[test]
    fn test_clones_count_together() {
        let writer_side = BackpressureController::new(4);
        let sender_side = writer_side.clone();

        let guard = sender_side.try_reserve().unwrap();
        assert_eq!(writer_side.pending_count(), 1);
        drop(guard);
        assert_eq!(sender_side.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reserve_gives_up_after_timeout() {
        let slots = BackpressureController::with_timeout(1, Duration::from_millis(10));
        let _full = slots.try_reserve().unwrap();

        let started = std::time::Instant::now();
        assert!(matches!(
            slots.reserve().await,
            Err(StreamingError::BackpressureTimeout)
        ));
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_reserve_wakes_when_slot_frees() {
        let slots = BackpressureController::with_timeout(1, Duration::from_secs(1));
        let full = slots.try_reserve().unwrap();

        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.reserve().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        drop(full);

        waiter.await.unwrap().unwrap();
        assert_eq!(slots.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_many_waiters_all_get_slots() {
        let slots = BackpressureController::with_timeout(2, Duration::from_secs(1));
        let held: Vec<_> = (0..2).map(|_| slots.try_reserve().unwrap()).collect();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let slots = slots.clone();
                tokio::spawn(async move {
                    let guard = slots.reserve().await.unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    drop(guard);
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(slots.pending_count(), 0);
    }
}
