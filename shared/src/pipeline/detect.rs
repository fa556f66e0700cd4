//! Per-camera detection worker.

use super::{CameraShared, FrameCounter, PipelineError, SessionState};
use crate::config::DetectionConfig;
use crate::frame::Frame;
use crate::image_proc::{extract_detections, BackgroundModel};
use crate::output::TrackingRow;
use crossbeam_channel::Receiver;
use std::fs::File;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Consumes the detect queue, segments targets and publishes them.
///
/// Runs background subtraction and blob extraction on every frame,
/// publishes the detection set to the camera's shared board (bounded,
/// overflow counted) and, while recording, appends one row per
/// detection to `tracking/<camera>.csv`. Blocks only on the queue
/// receive; shutdown releases it through channel disconnect.
pub struct DetectionWorker {
    camera_id: String,
    state: Arc<SessionState>,
    shared: Arc<CameraShared>,
    rx: Receiver<Frame>,
    background: BackgroundModel,
    metadata: csv::Writer<File>,
}

impl DetectionWorker {
    pub fn new(
        camera_id: &str,
        config: &DetectionConfig,
        state: Arc<SessionState>,
        shared: Arc<CameraShared>,
        rx: Receiver<Frame>,
        metadata: csv::Writer<File>,
    ) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            state,
            shared,
            rx,
            background: BackgroundModel::new(config.alpha, config.threshold),
            metadata,
        }
    }

    /// Run the detection loop on a dedicated thread.
    pub fn spawn(self) -> JoinHandle<()> {
        let camera_id = self.camera_id.clone();
        std::thread::spawn(move || {
            if let Err(e) = self.run() {
                tracing::error!("detection worker [{camera_id}] failed: {e}");
            }
        })
    }

    fn run(mut self) -> Result<(), PipelineError> {
        tracing::info!("detection worker [{}] started", self.camera_id);
        let mut counter = FrameCounter::new(format!("detect {}", self.camera_id));

        while let Ok(frame) = self.rx.recv() {
            if !self.state.is_running() {
                break;
            }

            let mask = self.background.apply(&frame.pixels);
            let detections = extract_detections(&frame, &mask.view());

            // The metadata stream receives every detection; only the
            // shared board applies the capacity bound.
            if self.state.is_recording() {
                let actuator_value = self.state.actuator_value();
                for detection in &detections {
                    self.metadata
                        .serialize(TrackingRow::from_detection(&frame, detection, actuator_value))?;
                }
            }

            self.shared.detections.publish(&detections);

            if let Some(rate) = counter.step() {
                self.shared.detect_rate.store(rate);
            }
        }

        self.metadata.flush()?;
        tracing::info!("detection worker [{}] shutting down", self.camera_id);
        Ok(())
    }
}
