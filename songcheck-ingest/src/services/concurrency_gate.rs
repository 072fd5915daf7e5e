//! System-wide admission control
//!
//! Admits at most `capacity` concurrent pipeline executions (and index
//! rebuilds). Excess callers queue in FIFO order on the semaphore instead of
//! piling up buffered uploads and scratch directories behind the worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("concurrency gate is closed")]
pub struct GateClosed;

#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    active: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
}

/// Held for the duration of one admitted execution
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WaitingGuard(Arc<AtomicUsize>);

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            active: Arc::new(AtomicUsize::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a slot
    ///
    /// Fails once [`close`](Self::close) has been called, including for
    /// callers already queued.
    pub async fn admit(&self) -> Result<GatePermit, GateClosed> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let waiting = WaitingGuard(Arc::clone(&self.waiting));

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        drop(waiting);

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(GatePermit {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Reject queued and future admissions; admitted executions keep running
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
