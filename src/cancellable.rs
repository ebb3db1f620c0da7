// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Marks an absent deadline in [TimeoutCancellable::deadline_nanos].
const NO_DEADLINE: u64 = u64::MAX;

/// Why a [TimeoutCancellable] reports (or doesn't report) cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellableStatus {
    Active,
    CancelCalled,
    DeadlineExceeded,
}

impl std::fmt::Display for CancellableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::CancelCalled => write!(f, "cancel called"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// A thread-safe cancellation flag with an optional timeout.
///
/// The timeout is measured on the monotonic clock from the last call to
/// [reset](Self::reset) (or from construction). All methods take `&self` and
/// only touch atomics, so a worker may poll [is_cancelled](Self::is_cancelled)
/// in a tight loop while another thread calls [cancel](Self::cancel).
#[derive(Debug)]
pub struct TimeoutCancellable {
    base: Instant,
    cancelled: AtomicBool,
    timeout_nanos: AtomicU64,
    reset_nanos: AtomicU64,
    deadline_nanos: AtomicU64,
}

impl Default for TimeoutCancellable {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutCancellable {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            cancelled: AtomicBool::new(false),
            timeout_nanos: AtomicU64::new(0),
            reset_nanos: AtomicU64::new(0),
            deadline_nanos: AtomicU64::new(NO_DEADLINE),
        }
    }

    /// Sets the timeout, counted from the last [reset](Self::reset).
    /// Zero disables the timeout.
    pub fn set_timeout(&self, seconds: u32) {
        let timeout = Duration::from_secs(seconds.into()).as_nanos() as u64;
        self.timeout_nanos.store(timeout, Ordering::Release);
        self.update_deadline(self.reset_nanos.load(Ordering::Acquire), timeout);
    }

    /// Clears the explicit cancellation and restarts the timeout.
    pub fn reset(&self) {
        let now = self.now_nanos();
        self.reset_nanos.store(now, Ordering::Release);
        self.update_deadline(now, self.timeout_nanos.load(Ordering::Acquire));
        self.cancelled.store(false, Ordering::Release);
    }

    /// Requests cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if [cancel](Self::cancel) was called, or if the timeout has elapsed.
    pub fn is_cancelled(&self) -> bool {
        self.status() != CancellableStatus::Active
    }

    pub fn status(&self) -> CancellableStatus {
        if self.cancelled.load(Ordering::Acquire) {
            return CancellableStatus::CancelCalled;
        }

        let deadline = self.deadline_nanos.load(Ordering::Acquire);
        if deadline != NO_DEADLINE && self.now_nanos() >= deadline {
            CancellableStatus::DeadlineExceeded
        } else {
            CancellableStatus::Active
        }
    }

    fn update_deadline(&self, since: u64, timeout: u64) {
        let deadline = if timeout == 0 {
            NO_DEADLINE
        } else {
            since.saturating_add(timeout).min(NO_DEADLINE - 1)
        };
        self.deadline_nanos.store(deadline, Ordering::Release);
    }

    fn now_nanos(&self) -> u64 {
        self.base.elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn explicit_cancel() {
        let c = TimeoutCancellable::new();
        assert!(!c.is_cancelled());

        c.cancel();
        c.cancel();
        assert!(c.is_cancelled());
        assert_eq!(c.status(), CancellableStatus::CancelCalled);

        c.reset();
        assert!(!c.is_cancelled());
    }

    #[test]
    fn timeout() {
        let c = TimeoutCancellable::new();
        c.set_timeout(1);
        c.reset();
        assert!(!c.is_cancelled());

        thread::sleep(Duration::from_millis(1100));
        assert!(c.is_cancelled());
        assert_eq!(c.status(), CancellableStatus::DeadlineExceeded);

        // Reset restarts the clock
        c.reset();
        assert!(!c.is_cancelled());
    }

    #[test]
    fn zero_timeout_never_expires() {
        let c = TimeoutCancellable::new();
        c.set_timeout(1);
        c.set_timeout(0);
        c.reset();
        thread::sleep(Duration::from_millis(1100));
        assert!(!c.is_cancelled());
    }

    #[test]
    fn cancel_from_another_thread() {
        let c = Arc::new(TimeoutCancellable::new());
        let worker = {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                let mut spins: u64 = 0;
                while !c.is_cancelled() {
                    spins += 1;
                    thread::yield_now();
                }
                spins
            })
        };

        thread::sleep(Duration::from_millis(20));
        c.cancel();
        worker.join().unwrap();
        assert!(c.is_cancelled());
    }
}
