//! Deferred release of shared resources.
//!
//! A resource registered with a [`Reclaimer`] is wrapped in a
//! [`Reclaimable`] and shared through an `Arc`. Dropping the cache's own
//! reference (eviction, invalidation, shutdown) does not close it; the
//! resource is closed exactly once, on whichever thread drops the last
//! reference. That may be the cache itself, or an iterator finishing long
//! after the entry was evicted.
//!
//! The reclaimer counts live resources so that shutdown can wait until every
//! one of them has been closed.

use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use sstable::Table;
use tracing::{debug, warn};

/// A resource with an explicit close step.
pub trait Closeable {
    type Error: fmt::Display;

    /// Releases the underlying OS resources.
    fn close(&mut self) -> Result<(), Self::Error>;
}

impl Closeable for Table {
    type Error = sstable::Error;

    fn close(&mut self) -> sstable::Result<()> {
        Table::close(self)
    }
}

#[derive(Debug, Default)]
struct ReclaimState {
    /// Resources reserved or tracked and not yet closed.
    live: Mutex<usize>,
    idle: Condvar,
    /// Resources the cache has let go of that still have other holders.
    pending: AtomicUsize,
    closed: AtomicU64,
    close_failures: AtomicU64,
}

impl ReclaimState {
    fn release_one(&self) {
        let mut live = self.live.lock();
        *live -= 1;
        if *live == 0 {
            self.idle.notify_all();
        }
    }
}

/// Point-in-time counters of a [`Reclaimer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Resources still open.
    pub live: usize,
    /// Deferred resources waiting for their last holder to let go.
    pub pending: usize,
    /// Resources closed so far.
    pub closed: u64,
    /// Closes that returned an error or panicked.
    pub close_failures: u64,
}

/// Tracks shared resources and closes them when their last holder is gone.
///
/// Cloning a `Reclaimer` yields another handle to the same counters.
#[derive(Debug, Clone, Default)]
pub struct Reclaimer {
    state: Arc<ReclaimState>,
}

impl Reclaimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` and returns the first shared reference to it.
    ///
    /// `label` identifies the resource in log output.
    pub fn track<T: Closeable>(&self, label: impl Into<String>, value: T) -> Arc<Reclaimable<T>> {
        self.reserve().fill(label, value)
    }

    /// Counts a resource that is about to be created, so that
    /// [`wait_idle`](Self::wait_idle) also waits for it. Dropping the
    /// reservation unfilled gives the slot back.
    pub fn reserve(&self) -> Reservation {
        *self.state.live.lock() += 1;
        Reservation {
            state: Arc::clone(&self.state),
            filled: false,
        }
    }

    /// Gives up one reference to `handle` and marks it for release.
    ///
    /// If this was the last reference the resource is closed right away.
    /// Otherwise it is closed when the remaining holders drop theirs.
    pub fn defer<T: Closeable>(&self, handle: Arc<Reclaimable<T>>) {
        if !handle.deferred.swap(true, Ordering::AcqRel) {
            self.state.pending.fetch_add(1, Ordering::AcqRel);
        }
        let other_holders = Arc::strong_count(&handle) - 1;
        if other_holders > 0 {
            debug!(
                resource = %handle.label,
                holders = other_holders,
                "release deferred until remaining holders finish"
            );
        }
        drop(handle);
    }

    /// Blocks until every tracked resource has been closed.
    pub fn wait_idle(&self) {
        let mut live = self.state.live.lock();
        while *live > 0 {
            self.state.idle.wait(&mut live);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle), but gives up after `timeout`.
    ///
    /// Returns `true` if every tracked resource was closed in time.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = self.state.live.lock();
        while *live > 0 {
            if self.state.idle.wait_until(&mut live, deadline).timed_out() {
                return *live == 0;
            }
        }
        true
    }

    /// Number of tracked resources not yet closed.
    pub fn live(&self) -> usize {
        *self.state.live.lock()
    }

    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            live: self.live(),
            pending: self.state.pending.load(Ordering::Acquire),
            closed: self.state.closed.load(Ordering::Acquire),
            close_failures: self.state.close_failures.load(Ordering::Acquire),
        }
    }
}

/// A slot counted by a [`Reclaimer`] before its resource exists.
#[must_use = "dropping a reservation releases it immediately"]
#[derive(Debug)]
pub struct Reservation {
    state: Arc<ReclaimState>,
    filled: bool,
}

impl Reservation {
    /// Turns the reservation into a tracked resource.
    pub fn fill<T: Closeable>(mut self, label: impl Into<String>, value: T) -> Arc<Reclaimable<T>> {
        self.filled = true;
        Arc::new(Reclaimable {
            value,
            label: label.into(),
            deferred: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.filled {
            self.state.release_one();
        }
    }
}

/// A tracked resource. Closed when the last `Arc` to it is dropped.
pub struct Reclaimable<T: Closeable> {
    value: T,
    label: String,
    deferred: AtomicBool,
    state: Arc<ReclaimState>,
}

impl<T: Closeable> Reclaimable<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the owner has already let go of this resource.
    pub fn is_deferred(&self) -> bool {
        self.deferred.load(Ordering::Acquire)
    }
}

impl<T: Closeable> Deref for Reclaimable<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Closeable> fmt::Debug for Reclaimable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reclaimable")
            .field("label", &self.label)
            .field("deferred", &self.is_deferred())
            .finish()
    }
}

impl<T: Closeable> Drop for Reclaimable<T> {
    fn drop(&mut self) {
        let value = &mut self.value;
        match panic::catch_unwind(AssertUnwindSafe(|| value.close())) {
            Ok(Ok(())) => {
                self.state.closed.fetch_add(1, Ordering::AcqRel);
                debug!(resource = %self.label, "released");
            }
            Ok(Err(e)) => {
                self.state.close_failures.fetch_add(1, Ordering::AcqRel);
                warn!(resource = %self.label, error = %e, "failed to release; resource may leak");
            }
            Err(_) => {
                self.state.close_failures.fetch_add(1, Ordering::AcqRel);
                warn!(resource = %self.label, "panic while releasing; resource may leak");
            }
        }

        if self.deferred.load(Ordering::Acquire) {
            self.state.pending.fetch_sub(1, Ordering::AcqRel);
        }

        self.state.release_one();
    }
}
