//! Liveness watchdog: abort the process when pings stop arriving.
//!
//! A watchdog polls a ping timestamp once per second from a callback-mode
//! [`Ticker`]. If the timestamp goes stale past the configured expiry it
//! writes a diagnostic to stderr and exits the process. The point is a
//! loud, fast death for a wedged program, not graceful recovery.

use std::backtrace::Backtrace;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use minstant::Instant;

use crate::timing::Ticker;
use crate::trace::error;

/// How often staleness is checked. Staleness is only ever observed at this
/// granularity, so an expiry below it effectively rounds up to one poll.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Process-liveness watchdog.
///
/// Call [`ping`](Self::ping) from the code whose liveness is being
/// certified, more often than `expiry`. Once [`start`](Self::start)ed, a
/// missed expiry window terminates the process with exit code 1 after
/// dumping a diagnostic to stderr. [`stop`](Self::stop) (or dropping the
/// watchdog) disarms it.
pub struct Watchdog {
    liveness: Arc<Liveness>,
    ticker: Ticker,
}

struct Liveness {
    expiry: Duration,
    /// Anchor for the atomic timestamp encoding.
    epoch: Instant,
    /// Nanoseconds from `epoch` to the most recent ping.
    last_ping: AtomicU64,
}

impl Liveness {
    fn ping(&self) {
        self.last_ping.store(self.elapsed_nanos(), Ordering::Relaxed);
    }

    fn stale(&self) -> bool {
        let since_ping = self
            .elapsed_nanos()
            .saturating_sub(self.last_ping.load(Ordering::Relaxed));
        Duration::from_nanos(since_ping) > self.expiry
    }

    fn elapsed_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl Watchdog {
    /// Creates a disarmed watchdog.
    ///
    /// # Panics
    ///
    /// Panics if `expiry` is zero.
    #[must_use]
    pub fn new(expiry: Duration) -> Self {
        assert!(!expiry.is_zero(), "watchdog expiry must be non-zero");

        let liveness = Arc::new(Liveness {
            expiry,
            epoch: Instant::now(),
            last_ping: AtomicU64::new(0),
        });
        let watched = Arc::clone(&liveness);
        let ticker = Ticker::with_callback(POLL_INTERVAL, move || {
            if watched.stale() {
                trip(&watched);
            }
        });

        Self { liveness, ticker }
    }

    /// Arms the watchdog, recording an initial ping.
    pub fn start(&self) {
        self.liveness.ping();
        self.ticker.start();
    }

    /// Disarms the watchdog. Idempotent; [`start`](Self::start) re-arms.
    pub fn stop(&self) {
        self.ticker.stop();
    }

    /// Records that the watched code is still alive.
    pub fn ping(&self) {
        self.liveness.ping();
    }
}

/// Terminal path: diagnostic dump, then exit.
fn trip(liveness: &Liveness) -> ! {
    error!(expiry = ?liveness.expiry, "watchdog expired");
    eprintln!(
        "watchdog expired: no ping within {:?}; aborting\n{}",
        liveness.expiry,
        Backtrace::force_capture(),
    );
    process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    #[should_panic(expected = "watchdog expiry must be non-zero")]
    fn zero_expiry_panics() {
        let _ = Watchdog::new(Duration::ZERO);
    }

    #[test]
    fn fresh_ping_is_not_stale() {
        let watchdog = Watchdog::new(Duration::from_millis(50));
        watchdog.ping();
        assert!(!watchdog.liveness.stale());
    }

    #[test]
    fn silence_past_expiry_goes_stale() {
        let watchdog = Watchdog::new(Duration::from_millis(10));
        watchdog.ping();

        thread::sleep(Duration::from_millis(40));
        assert!(watchdog.liveness.stale());

        watchdog.ping();
        assert!(!watchdog.liveness.stale());
    }

    #[test]
    fn unpinged_watchdog_counts_from_its_epoch() {
        // Never pinged: last_ping sits at the epoch, so a young watchdog is
        // not yet stale.
        let watchdog = Watchdog::new(Duration::from_secs(3600));
        assert!(!watchdog.liveness.stale());
    }

    #[test]
    fn start_and_stop_cycle_without_tripping() {
        // Expiry far above the test runtime: the poll callback may run but
        // can never observe staleness.
        let watchdog = Watchdog::new(Duration::from_secs(3600));
        watchdog.start();
        thread::sleep(Duration::from_millis(20));
        watchdog.stop();
        watchdog.stop();
    }
}
