// src/sync/semaphore.rs

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

/// Counting semaphore with FIFO waiters and scoped acquisition.
///
/// Thin wrapper over `tokio::sync::Semaphore`, which releases waiters in
/// enqueue order; this layer adds the held-permit count the workflow
/// reports as `active`.
pub struct Semaphore {
    inner: Arc<tokio::sync::Semaphore>,
    active: Arc<AtomicUsize>,
    max: usize,
}

/// A held permit, released when dropped, whatever the exit path.
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Semaphore {
    /// `max` is clamped to at least one permit.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            inner: Arc::new(tokio::sync::Semaphore::new(max)),
            active: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    /// Reserve one permit, suspending until one is available. Waiters are
    /// released in enqueue order.
    pub async fn acquire(&self) -> Permit {
        // The inner semaphore is never closed, so acquisition cannot fail.
        let permit = self
            .inner
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        self.active.fetch_add(1, Ordering::SeqCst);
        Permit {
            _permit: permit,
            active: self.active.clone(),
        }
    }

    /// Run `f` while holding one permit; the permit is released on success,
    /// failure, and cancellation alike.
    pub async fn with_lock<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let _permit = self.acquire().await;
        f().await
    }

    /// Number of currently held permits.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// True when every permit is held.
    pub fn locked(&self) -> bool {
        self.active() >= self.max
    }
}
