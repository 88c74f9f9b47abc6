//! Timing primitives.
//!
//! [`Ticker`] is the public surface: a drift-correcting periodic timer with
//! concurrent start/stop/reset. The one-shot wake-up it re-arms between
//! ticks is crate-internal.

mod alarm;
mod ticker;

pub use ticker::{Ticker, Ticks};
