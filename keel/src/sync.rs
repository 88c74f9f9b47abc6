//! Synchronization primitives for in-process communication.

pub mod signal;
