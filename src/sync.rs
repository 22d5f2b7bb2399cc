//! Cross-worker cancellation signal.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A resettable boolean signal with a blocking timed wait.
///
/// Used to coordinate workers across threads: the server's sender worker
/// waits on it with the frame interval as timeout (the wait doubles as the
/// pacer), and the client uses one to release callers blocked until a pause
/// has been acknowledged.
///
/// Unlike a one-shot shutdown flag, the signal can be [`clear`](Self::clear)ed
/// and reused across pause/resume cycles.
#[derive(Debug, Default)]
pub struct Signal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake all waiters.
    pub fn set(&self) {
        let mut set = self.set.lock();
        *set = true;
        self.cond.notify_all();
    }

    /// Lower the signal so future waits block again.
    pub fn clear(&self) {
        *self.set.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Block until the signal is set or the timeout elapses.
    ///
    /// Returns whether the signal is set when the wait ends.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut set = self.set.lock();
        if *set {
            return true;
        }
        self.cond.wait_for(&mut set, timeout);
        *set
    }
}
