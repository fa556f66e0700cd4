//! Per-camera capture worker.

use super::{CameraShared, FrameCounter, SessionState};
use crate::camera_interface::CameraInterface;
use crate::frame::Frame;
use crate::timestamp::Timestamp;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Pulls frames from the driver and fans them out.
///
/// Each captured frame is timestamped, written to the best-effort
/// preview slot and pushed as a full copy onto the record and detect
/// queues. The worker never blocks on a downstream consumer; the only
/// blocking point is the driver's capture call itself.
pub struct CaptureWorker {
    camera_id: String,
    camera: Box<dyn CameraInterface>,
    state: Arc<SessionState>,
    shared: Arc<CameraShared>,
    record_tx: Sender<Frame>,
    detect_tx: Sender<Frame>,
}

impl CaptureWorker {
    pub fn new(
        camera: Box<dyn CameraInterface>,
        state: Arc<SessionState>,
        shared: Arc<CameraShared>,
        record_tx: Sender<Frame>,
        detect_tx: Sender<Frame>,
    ) -> Self {
        Self {
            camera_id: camera.name().to_string(),
            camera,
            state,
            shared,
            record_tx,
            detect_tx,
        }
    }

    /// Run the capture loop on a dedicated thread.
    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::spawn(move || self.run())
    }

    fn run(mut self) {
        tracing::info!("capture worker [{}] started", self.camera_id);
        let mut counter = FrameCounter::new(format!("capture {}", self.camera_id));
        let mut frame_index = 0u64;

        while self.state.is_running() {
            let (pixels, capture_timestamp) = match self.camera.capture() {
                Ok(captured) => captured,
                Err(e) => {
                    tracing::error!("capture worker [{}] stopping: {e}", self.camera_id);
                    break;
                }
            };

            // Frame numbering is recording-relative: outside a
            // recording every frame carries index 0.
            if self.state.is_recording() {
                frame_index += 1;
            }

            let frame = Frame {
                camera_id: self.camera_id.clone(),
                frame_index,
                capture_timestamp,
                process_timestamp: Timestamp::now(),
                pixels,
            };

            self.shared.preview.publish(frame.clone());

            // Unbounded sends cannot block; they only fail once both
            // consumers are gone, at which point capture is done too.
            if self.record_tx.send(frame.clone()).is_err() {
                break;
            }
            if self.detect_tx.send(frame).is_err() {
                break;
            }

            if let Some(rate) = counter.step() {
                self.shared.capture_rate.store(rate);
            }
        }

        // Dropping the senders disconnects the queues, releasing the
        // record and detect workers from their blocking receive. The
        // camera handle closes when `self.camera` drops.
        tracing::info!("capture worker [{}] shutting down", self.camera_id);
    }
}
