//! One-shot wake-up: arm for a duration, cancel if still pending.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use minstant::Instant;

/// Handle to a pending one-shot wake-up.
///
/// Arming spawns a dedicated thread that sleeps until the deadline and then
/// runs the action, unless cancelled first. Cancellation is edge-triggered:
/// once the deadline has passed and the action has begun, both
/// [`cancel`](Self::cancel) and drop are no-ops. Dropping the handle cancels
/// a still-pending wake-up.
pub(crate) struct Alarm {
    shared: Arc<Shared>,
}

struct Shared {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

impl Alarm {
    /// Arms a wake-up that runs `action` once `delay` has elapsed.
    pub(crate) fn arm<F>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            cancelled: Mutex::new(false),
            cond: Condvar::new(),
        });

        let waiter = Arc::clone(&shared);
        thread::Builder::new()
            .name("keel-alarm".into())
            .spawn(move || waiter.sleep_then(delay, action))
            .expect("failed to spawn alarm thread");

        Self { shared }
    }

    /// Cancels the wake-up if it has not started firing yet.
    pub(crate) fn cancel(&self) {
        let mut cancelled = self.shared.lock_cancelled();
        *cancelled = true;
        self.shared.cond.notify_all();
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Shared {
    fn lock_cancelled(&self) -> MutexGuard<'_, bool> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep_then<F: FnOnce()>(self: Arc<Self>, delay: Duration, action: F) {
        let deadline = Instant::now() + delay;
        let mut cancelled = self.lock_cancelled();
        loop {
            if *cancelled {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            // Spurious wake-ups fall through to another deadline check.
            let (guard, _) = self
                .cond
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
        // The cancelled flag is released before the action runs: a cancel
        // arriving from here on is too late, which is the documented
        // at-most-one-straggler window.
        drop(cancelled);
        action();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&fired);
        (fired, move || setter.store(true, Ordering::SeqCst))
    }

    #[test]
    fn fires_after_delay() {
        let (fired, action) = flag();
        let _alarm = Alarm::arm(Duration::from_millis(20), action);

        thread::sleep(Duration::from_millis(5));
        assert!(!fired.load(Ordering::SeqCst), "fired before the deadline");

        thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst), "never fired");
    }

    #[test]
    fn cancel_prevents_firing() {
        let (fired, action) = flag();
        let alarm = Alarm::arm(Duration::from_millis(30), action);

        alarm.cancel();
        thread::sleep(Duration::from_millis(100));
        assert!(!fired.load(Ordering::SeqCst), "fired despite cancel");
    }

    #[test]
    fn drop_cancels_pending_wakeup() {
        let (fired, action) = flag();
        drop(Alarm::arm(Duration::from_millis(30), action));

        thread::sleep(Duration::from_millis(100));
        assert!(!fired.load(Ordering::SeqCst), "fired despite drop");
    }

    #[test]
    fn cancel_after_firing_is_a_noop() {
        let (fired, action) = flag();
        let alarm = Alarm::arm(Duration::from_millis(5), action);

        thread::sleep(Duration::from_millis(80));
        assert!(fired.load(Ordering::SeqCst));
        alarm.cancel();
        alarm.cancel();
    }
}
