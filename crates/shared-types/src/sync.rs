//! Blocking signal primitives used by the framework's worker threads.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A resettable stop flag that sleeping loops can wait on.
///
/// Loops call `wait_timeout(interval)` instead of sleeping, so a stop request
/// interrupts the sleep immediately.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn signal(&self) {
        let mut stopped = self.stopped.lock();
        *stopped = true;
        self.cond.notify_all();
    }

    /// Lower the flag so the signal can be reused for another run.
    pub fn reset(&self) {
        *self.stopped.lock() = false;
    }

    #[must_use]
    pub fn is_signalled(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for at most `timeout`. Returns `true` if the flag is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// A one-shot gate: once released it stays open.
#[derive(Debug, Default)]
pub struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.cond.notify_all();
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        *self.open.lock()
    }

    /// Block until released.
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    /// Block until released or `timeout` elapses. Returns `true` if released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut open = self.open.lock();
        while !*open {
            if self.cond.wait_until(&mut open, deadline).timed_out() {
                break;
            }
        }
        *open
    }
}
