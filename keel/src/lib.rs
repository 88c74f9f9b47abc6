//! Small, independent operating-system and I/O utility helpers.
//!
//! The centerpiece is [`timing::Ticker`], a drift-correcting periodic timer
//! that is safe to start, stop, and reset from any thread while a tick is in
//! flight. Around it sit a handful of unrelated conveniences:
//!
//! - [`error`] - error wrapping, source-chain queries, and aggregation
//! - [`fs::lock`] - advisory `fcntl` file locks, including atomic
//!   create-and-lock
//! - [`io`] - closable-stream decorators with ordered teardown
//! - [`codec`] - length-prefixed byte-block framing
//! - [`sync::signal`] - a coalescing single-slot notification channel
//! - [`watchdog`] - ping-or-abort process liveness
//!
//! Trace output is available behind the `tracing` feature; call
//! [`init_tracing`] once at startup to enable it.

pub mod codec;
pub mod error;
pub mod fs;
pub mod io;
pub mod sync;
pub mod timing;
mod trace;
pub mod watchdog;

pub use trace::init_tracing;
