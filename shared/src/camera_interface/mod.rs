//! Camera abstraction layer.
//!
//! Provides a unified interface for camera operations that can be
//! backed by real hardware (for production) or a scripted mock (for
//! tests and simulation). The driver itself lives outside this
//! repository; this is the seam the pipeline consumes.

pub mod mock;

use crate::timestamp::Timestamp;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for camera operations
#[derive(Debug, Error)]
pub enum CameraError {
    /// Camera hardware could not be found or opened at startup.
    /// Fatal: the session aborts before any worker starts.
    #[error("camera hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Frame capture failed mid-stream
    #[error("capture failed: {0}")]
    Capture(String),

    /// A configuration setting was rejected by the driver
    #[error("configuration rejected: {0}")]
    Config(String),
}

/// Result type for camera operations
pub type CameraResult<T> = Result<T, CameraError>;

/// An opaque configuration value passed through to the driver.
///
/// The pipeline does not interpret these; they are forwarded verbatim
/// to the driver's configuration surface (resolution, trigger mode,
/// exposure, gain, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Trait for the unified camera interface.
///
/// `capture` is a blocking call: it returns only when the driver hands
/// over a frame. There is no timeout path; a worker waiting here is
/// released by session shutdown, not by an error.
pub trait CameraInterface: Send {
    /// Block until the next frame is available.
    ///
    /// Returns the intensity grid together with the driver-side capture
    /// timestamp.
    fn capture(&mut self) -> CameraResult<(Array2<u8>, Timestamp)>;

    /// Forward opaque key/value settings to the driver.
    fn apply_settings(&mut self, settings: &[(String, SettingValue)]) -> CameraResult<()>;

    /// Human-readable camera identifier.
    fn name(&self) -> &str;
}
