//! Drift-correcting periodic timer with concurrent control.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use minstant::Instant;

use crate::sync::signal;
use crate::timing::alarm::Alarm;
use crate::trace::{debug, trace};

/// Receiver half of a signal-mode ticker's notification channel.
///
/// Blocking-receive semantics are the consumer's choice; the ticker side
/// never blocks on it. See [`signal::Receiver`].
pub type Ticks = signal::Receiver;

/// A periodic timer that corrects for scheduling drift and tolerates
/// concurrent control from other threads while a tick is in flight.
///
/// Instead of a fixed-rate repeating timer, a `Ticker` re-arms a one-shot
/// wake-up after every tick and computes each deadline from the previous
/// *intended* deadline. A late firing therefore does not push the whole
/// schedule back, and a wake-up orphaned by a concurrent [`stop`](Self::stop)
/// or [`reset`](Self::reset) can be detected and discarded.
///
/// Ticks are delivered in one of two modes, fixed at construction:
///
/// - **Signal mode** ([`Ticker::new`]): each tick posts to a single-slot
///   [`Ticks`] handle. The producer never blocks; ticks that pile up behind
///   a slow consumer coalesce into one pending notification.
/// - **Callback mode** ([`Ticker::with_callback`]): each tick invokes the
///   callback on its own thread. Invocations are never serialized against
///   each other, so a callback that outlives the interval overlaps the next
///   one.
///
/// Handles are cheap to clone and share one underlying timer. A freshly
/// constructed ticker is stopped; dropping every handle while running
/// disarms the pending wake-up.
#[derive(Clone)]
pub struct Ticker {
    shared: Arc<Shared>,
}

struct Shared {
    interval: Duration,
    delivery: Delivery,
    state: Mutex<State>,
}

/// Fields guarded by the ticker lock.
struct State {
    /// Currently armed wake-up; `None` exactly when the ticker is stopped.
    alarm: Option<Alarm>,
    /// Absolute instant the current arrangement intends to fire next.
    /// Meaningful only while `alarm` is armed.
    next_deadline: Instant,
}

enum Delivery {
    Signal(signal::Notifier),
    Callback(Arc<dyn Fn() + Send + Sync>),
}

impl Ticker {
    /// Creates a stopped signal-mode ticker and its notification handle.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero. (Negative intervals are
    /// unrepresentable.)
    #[must_use]
    pub fn new(interval: Duration) -> (Self, Ticks) {
        let (notifier, ticks) = signal::channel();
        (Self::build(interval, Delivery::Signal(notifier)), ticks)
    }

    /// Creates a stopped callback-mode ticker.
    ///
    /// Each tick runs `callback` on its own thread and is never awaited by
    /// the ticker, so a slow callback cannot delay the next scheduling
    /// decision.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn with_callback<F>(interval: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(interval, Delivery::Callback(Arc::new(callback)))
    }

    fn build(interval: Duration, delivery: Delivery) -> Self {
        assert!(!interval.is_zero(), "ticker interval must be non-zero");
        Self {
            shared: Arc::new(Shared {
                interval,
                delivery,
                state: Mutex::new(State {
                    alarm: None,
                    next_deadline: Instant::now(),
                }),
            }),
        }
    }

    /// Starts the ticker. The first tick fires one interval from now.
    ///
    /// No-op if already running: the pending deadline is left untouched.
    pub fn start(&self) {
        let mut state = self.shared.lock_state();
        if state.alarm.is_none() {
            self.shared.rearm(&mut state);
        }
    }

    /// Starts the ticker and delivers one tick immediately.
    ///
    /// The immediate tick is out-of-band: it does not advance the schedule.
    /// In callback mode it may be observed back-to-back with a
    /// near-simultaneous scheduled tick; in signal mode the two would
    /// coalesce.
    pub fn start_now(&self) {
        self.start();
        self.shared.deliver();
    }

    /// Re-arms the ticker: the next tick fires one interval from now,
    /// superseding any previously pending deadline. Starts the ticker if it
    /// was stopped.
    pub fn reset(&self) {
        let mut state = self.shared.lock_state();
        self.shared.rearm(&mut state);
    }

    /// [`reset`](Self::reset), plus one immediate out-of-band tick (see
    /// [`start_now`](Self::start_now)).
    pub fn reset_now(&self) {
        self.reset();
        self.shared.deliver();
    }

    /// Stops the ticker, cancelling the pending wake-up. Idempotent.
    ///
    /// A firing already past its delivery step cannot be recalled: at most
    /// one straggler tick may still be observed after `stop` returns.
    pub fn stop(&self) {
        let mut state = self.shared.lock_state();
        if let Some(alarm) = state.alarm.take() {
            alarm.cancel();
            debug!("ticker stopped");
        }
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self.shared.lock_state().alarm.is_some();
        f.debug_struct("Ticker")
            .field("interval", &self.shared.interval)
            .field("running", &running)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // State transitions are total; recover the guard rather than
        // surface a poisoning mode the API has no channel for.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels any pending wake-up and arms a fresh one a full interval out.
    fn rearm(self: &Arc<Self>, state: &mut State) {
        state.next_deadline = Instant::now() + self.interval;
        // The assignment drops (and thereby cancels) the superseded alarm.
        state.alarm = Some(self.arm(self.interval));
        debug!(interval = ?self.interval, "ticker armed");
    }

    fn arm(self: &Arc<Self>, delay: Duration) -> Alarm {
        let shared = Arc::downgrade(self);
        Alarm::arm(delay, move || {
            // A ticker with no surviving handles has nothing to deliver to.
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.fire();
            }
        })
    }

    /// Firing handler, run on the alarm's thread.
    fn fire(self: Arc<Self>) {
        // Capture the firing instant before taking the lock so a delayed
        // acquisition does not skew the drift computation.
        let now = Instant::now();

        // Deliver before locking: a slow consumer or callback must not hold
        // up a concurrent stop/reset or the rescheduling decision below.
        self.deliver();

        let mut state = self.lock_state();

        if state.alarm.is_none() {
            // Stopped between the firing and lock acquisition.
            trace!("discarding orphaned firing (stopped)");
            return;
        }
        if now < state.next_deadline {
            // A concurrent reset superseded this arrangement and its own
            // wake-up has not fired yet; the newer arrangement stays
            // authoritative.
            trace!("discarding orphaned firing (reset in flight)");
            return;
        }

        // This firing is authoritative. Dropping the held handle cancels
        // it, normally a no-op since it is this very alarm and it already
        // fired. But if a reset armed a fresh alarm while this firing waited
        // on the lock and that alarm's deadline has also already passed, the
        // cancel is what keeps exactly one wake-up armed.
        state.alarm = None;
        state.next_deadline = state.next_deadline + self.interval;

        let rearm_at = Instant::now();
        let delay = if rearm_at <= state.next_deadline {
            state.next_deadline - rearm_at
        } else {
            // Missed the next slot outright (handler delayed under load or
            // across a suspend). Fold the overrun back onto the interval
            // grid rather than firing a catch-up burst.
            let overrun = rearm_at - state.next_deadline;
            self.interval - interval_rem(overrun, self.interval)
        };
        state.alarm = Some(self.arm(delay));
    }

    fn deliver(&self) {
        match &self.delivery {
            Delivery::Signal(notifier) => notifier.notify(),
            Delivery::Callback(callback) => {
                let callback = Arc::clone(callback);
                thread::Builder::new()
                    .name("keel-tick".into())
                    .spawn(move || callback())
                    .expect("failed to spawn tick callback thread");
            }
        }
    }
}

/// `overrun mod interval`, strictly less than `interval`.
fn interval_rem(overrun: Duration, interval: Duration) -> Duration {
    Duration::from_nanos((overrun.as_nanos() % interval.as_nanos()) as u64)
}
