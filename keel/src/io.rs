//! I/O decorator helpers.

mod nested;

pub use nested::{Close, Nested, NopClose};
