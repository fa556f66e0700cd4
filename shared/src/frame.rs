//! Frames and per-camera detections.

use crate::timestamp::Timestamp;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A single captured frame.
///
/// Frames are passed by value through the record/detect queues (full
/// copies, so capture never waits on a consumer) and replaced in-place
/// in the preview slot. `frame_index` advances only while the recording
/// flag is set, so frames captured outside a recording all share
/// index 0.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Which camera produced this frame
    pub camera_id: String,
    /// Recording-relative frame number
    pub frame_index: u64,
    /// Driver-side capture time
    pub capture_timestamp: Timestamp,
    /// Host-side time the frame entered the pipeline
    pub process_timestamp: Timestamp,
    /// Intensity grid, row-major (row = y, column = x)
    pub pixels: Array2<u8>,
}

impl Frame {
    /// Frame height in pixels.
    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    /// Frame width in pixels.
    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }
}

/// A single 2D detection extracted from one camera frame.
///
/// Detections form an unordered set per camera per frame; nothing
/// downstream may assume any ordering between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Which camera observed this target
    pub camera_id: String,
    /// Recording-relative frame number
    pub frame_index: u64,
    /// Centroid x-coordinate (column) with sub-pixel precision
    pub x: f64,
    /// Centroid y-coordinate (row) with sub-pixel precision
    pub y: f64,
    /// Zeroth moment of the foreground component (pixel count)
    pub area: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_dimensions() {
        let frame = Frame {
            camera_id: "cam0".to_string(),
            frame_index: 0,
            capture_timestamp: Timestamp::new(0, 0),
            process_timestamp: Timestamp::new(0, 0),
            pixels: Array2::zeros((48, 64)),
        };
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.width(), 64);
    }
}
