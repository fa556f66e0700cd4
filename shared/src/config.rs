//! Session and detection configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tuning for the per-camera detection worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Background update weight: `new = alpha * frame + (1 - alpha) * old`
    pub alpha: f64,
    /// Binary foreground threshold on the absolute background difference
    pub threshold: f64,
    /// Capacity of the shared detection buffer. Overflow is dropped
    /// silently; the drop count stays observable on the board.
    pub max_detections: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            threshold: 25.0,
            max_detections: 20,
        }
    }
}

/// Session-wide configuration shared by all workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Root directory for produced files (`raw/`, `tracking/`,
    /// `reconstruction/`)
    pub data_dir: PathBuf,
    /// Nominal camera frame rate, recorded for the video sinks
    pub framerate: f64,
    /// Detection worker tuning
    pub detection: DetectionConfig,
}

impl SessionConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            framerate: 100.0,
            detection: DetectionConfig::default(),
        }
    }
}
