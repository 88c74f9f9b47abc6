//! Single-slot coalescing notification channel.
//!
//! The producer never blocks: posting a notification while one is already
//! pending is absorbed into the existing one. A drained receiver therefore
//! learns "at least one event occurred since the last drain," never a count.
//!
//! # Example
//!
//! ```
//! use keel::sync::signal;
//!
//! let (notifier, receiver) = signal::channel();
//!
//! notifier.notify();
//! notifier.notify(); // coalesces with the first
//!
//! assert!(receiver.try_recv());
//! assert!(!receiver.try_recv());
//! ```

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use minstant::Instant;

/// Shared slot: at most one buffered notification.
struct Slot {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Slot {
    fn lock_pending(&self) -> MutexGuard<'_, bool> {
        // The flag flip is total; recover rather than propagate poisoning.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer half of the channel. Posting never blocks.
#[derive(Clone)]
pub struct Notifier {
    slot: Arc<Slot>,
}

/// Consumer half of the channel.
pub struct Receiver {
    slot: Arc<Slot>,
}

/// Creates a connected notifier/receiver pair with an empty slot.
#[must_use]
pub fn channel() -> (Notifier, Receiver) {
    let slot = Arc::new(Slot {
        pending: Mutex::new(false),
        cond: Condvar::new(),
    });

    let notifier = Notifier {
        slot: Arc::clone(&slot),
    };
    let receiver = Receiver { slot };

    (notifier, receiver)
}

impl Notifier {
    /// Posts a notification and wakes a blocked receiver.
    ///
    /// Never blocks. If a notification is already pending this one coalesces
    /// into it.
    pub fn notify(&self) {
        let mut pending = self.slot.lock_pending();
        if !*pending {
            *pending = true;
            self.slot.cond.notify_one();
        }
    }
}

impl Receiver {
    /// Takes the pending notification, if any, without blocking.
    #[must_use]
    pub fn try_recv(&self) -> bool {
        let mut pending = self.slot.lock_pending();
        std::mem::take(&mut *pending)
    }

    /// Blocks until a notification is pending, then takes it.
    pub fn recv(&self) {
        let mut pending = self.slot.lock_pending();
        while !*pending {
            pending = self
                .slot
                .cond
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *pending = false;
    }

    /// Blocks until a notification is pending or `timeout` elapses.
    ///
    /// Returns `true` if a notification was taken.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.slot.lock_pending();
        loop {
            if *pending {
                *pending = false;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // The loop re-checks after every wake-up, spurious or not.
            let (guard, _) = self
                .slot
                .cond
                .wait_timeout(pending, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            pending = guard;
        }
    }
}
