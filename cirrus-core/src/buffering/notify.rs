//! Consumer wake-up: a published-sample counter with blocking waits.
//!
//! The producer (capture callback) calls [`AvailabilityCounter::publish`]
//! when an utterance closes: an atomic fetch-add plus a condvar
//! `notify_one`, neither of which can block the real-time thread. The
//! consumer blocks in [`AvailabilityCounter::wait_available`]. Because the
//! producer notifies without holding the mutex, a wakeup can in principle be
//! lost; the consumer therefore waits with a timeout and re-checks, which
//! bounds that race at one timeout period instead of requiring the callback
//! to take a lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Count of ring-buffer samples published and not yet consumed.
#[derive(Default)]
pub struct AvailabilityCounter {
    count: AtomicUsize,
    lock: Mutex<()>,
    ready: Condvar,
}

impl AvailabilityCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `n` more samples visible to the consumer and wake it.
    ///
    /// The Release ordering pairs with the Acquire loads in
    /// `wait_available`/`available`, publishing the producer's relaxed
    /// ring-buffer stores along with the count.
    pub fn publish(&self, n: usize) -> usize {
        let prev = self.count.fetch_add(n, Ordering::Release);
        self.ready.notify_one();
        prev + n
    }

    /// Current published count.
    pub fn available(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Block until at least one sample is available or `timeout` elapses.
    ///
    /// Returns the observed count, which is `0` only on timeout. Never
    /// busy-spins; intended for the single dedicated consumer thread.
    pub fn wait_available(&self, timeout: Duration) -> usize {
        let n = self.available();
        if n > 0 {
            return n;
        }
        let mut guard = self.lock.lock();
        // Re-check under the lock, then wait out at most one timeout.
        let n = self.available();
        if n > 0 {
            return n;
        }
        let _ = self.ready.wait_for(&mut guard, timeout);
        self.available()
    }

    /// Subtract `n` after the consumer has copied that many samples out.
    ///
    /// Returns the count prior to subtraction for diagnostics.
    ///
    /// # Panics
    /// Panics if `n` exceeds the published count — that is a sizing/logic
    /// bug in the caller, not a recoverable runtime condition.
    pub fn take(&self, n: usize) -> usize {
        let prev = self.count.fetch_sub(n, Ordering::AcqRel);
        assert!(
            prev >= n,
            "availability underflow: take({n}) with only {prev} published"
        );
        prev
    }
}
