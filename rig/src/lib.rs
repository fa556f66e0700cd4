//! Session runner and offline batch drivers.
//!
//! The binary front-end lives in `main.rs`; the command implementations
//! are exposed here so integration tests can drive them directly.

pub mod batch;
pub mod simulate;
