//! Scripted mock camera for tests and simulation.

use super::{CameraError, CameraInterface, CameraResult, SettingValue};
use crate::timestamp::Timestamp;
use ndarray::Array2;
use std::time::Duration;

/// A camera that replays a pre-built frame script.
///
/// Timestamps advance by the configured frame interval on every
/// capture. With cycling enabled the script repeats forever; otherwise
/// an exhausted script fails the capture, which ends the capture worker
/// the same way a lost hardware connection would.
pub struct MockCamera {
    name: String,
    frames: Vec<Array2<u8>>,
    frame_interval: Duration,
    cycle: bool,
    cursor: usize,
    elapsed: Duration,
    settings: Vec<(String, SettingValue)>,
}

impl MockCamera {
    pub fn new(name: impl Into<String>, frames: Vec<Array2<u8>>) -> Self {
        Self {
            name: name.into(),
            frames,
            frame_interval: Duration::from_millis(10),
            cycle: false,
            cursor: 0,
            elapsed: Duration::ZERO,
            settings: Vec::new(),
        }
    }

    /// Repeat the frame script forever instead of failing at the end.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Override the simulated inter-frame interval.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Settings applied so far, in application order.
    pub fn applied_settings(&self) -> &[(String, SettingValue)] {
        &self.settings
    }
}

impl CameraInterface for MockCamera {
    fn capture(&mut self) -> CameraResult<(Array2<u8>, Timestamp)> {
        if self.frames.is_empty() {
            return Err(CameraError::Capture("empty frame script".to_string()));
        }

        if self.cursor >= self.frames.len() {
            if self.cycle {
                self.cursor = 0;
            } else {
                return Err(CameraError::Capture("frame script exhausted".to_string()));
            }
        }

        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        self.elapsed += self.frame_interval;

        Ok((frame, Timestamp::from_duration(self.elapsed)))
    }

    fn apply_settings(&mut self, settings: &[(String, SettingValue)]) -> CameraResult<()> {
        self.settings.extend_from_slice(settings);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
