//! Session state and the capture/record/detect worker loops.
//!
//! One capture, one record and one detect worker run per camera.
//! Communication is exclusively message passing: unbounded channels
//! carry full frame copies so capture never waits on a consumer, and a
//! single-slot overwrite buffer serves preview readers. Back-pressure
//! is intentionally uncapped: a stalled consumer grows its queue; that
//! is a documented operational risk, not something the pipeline hides.
//!
//! Shutdown is cooperative: every worker polls the running flag once
//! per loop iteration. Capture workers exit on the cleared flag and
//! drop their channel senders; consumers drain until the channel
//! disconnects, flush their outputs and exit. Nothing is force-killed
//! and nothing times out.

pub mod capture;
pub mod detect;
pub mod record;

use crate::frame::{Detection, Frame};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use thiserror::Error;

/// Errors surfaced by worker loops.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Camera(#[from] crate::camera_interface::CameraError),
}

/// Latest-wins preview buffer.
///
/// Single writer (the capture worker), any number of readers. This is
/// best-effort by design: readers may observe the same frame twice or
/// skip frames entirely, so it must only feed non-authoritative
/// consumers such as a preview display.
#[derive(Debug, Default)]
pub struct PreviewSlot {
    slot: Mutex<Option<Frame>>,
}

impl PreviewSlot {
    /// Replace the previewed frame.
    pub fn publish(&self, frame: Frame) {
        *self.slot.lock().unwrap() = Some(frame);
    }

    /// Clone out the most recent frame, if any.
    pub fn latest(&self) -> Option<Frame> {
        self.slot.lock().unwrap().clone()
    }
}

/// Capacity-bounded buffer holding the latest detection set of one
/// camera.
///
/// Overflow beyond capacity is dropped silently; the running drop count
/// stays queryable for tests and operations.
#[derive(Debug)]
pub struct DetectionBoard {
    capacity: usize,
    latest: Mutex<Vec<Detection>>,
    dropped: AtomicU64,
}

impl DetectionBoard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            latest: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Replace the board contents with this frame's detections,
    /// truncating at capacity.
    pub fn publish(&self, detections: &[Detection]) {
        if detections.len() > self.capacity {
            self.dropped
                .fetch_add((detections.len() - self.capacity) as u64, Ordering::Relaxed);
        }
        let mut latest = self.latest.lock().unwrap();
        latest.clear();
        latest.extend_from_slice(&detections[..detections.len().min(self.capacity)]);
    }

    /// Clone out the latest detection set.
    pub fn latest(&self) -> Vec<Detection> {
        self.latest.lock().unwrap().clone()
    }

    /// Total detections dropped to the capacity bound so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Lock-free f64 gauge for worker frequency readouts.
#[derive(Debug, Default)]
pub struct RateGauge {
    bits: AtomicU64,
}

impl RateGauge {
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Simple frames-per-second estimator, reporting once per period.
pub struct FrameCounter {
    label: String,
    period: std::time::Duration,
    last_report: Instant,
    frames: u32,
    last_rate: f64,
}

impl FrameCounter {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            period: std::time::Duration::from_secs(1),
            last_report: Instant::now(),
            frames: 0,
            last_rate: 0.0,
        }
    }

    /// Count one frame; returns the updated rate when a period elapsed.
    pub fn step(&mut self) -> Option<f64> {
        self.frames += 1;
        let elapsed = self.last_report.elapsed();
        if elapsed >= self.period {
            self.last_rate = self.frames as f64 / elapsed.as_secs_f64();
            self.frames = 0;
            self.last_report = Instant::now();
            tracing::debug!("[{}] running at {:.2} Hz", self.label, self.last_rate);
            Some(self.last_rate)
        } else {
            None
        }
    }

    pub fn rate(&self) -> f64 {
        self.last_rate
    }
}

/// Per-camera shared resources.
#[derive(Debug)]
pub struct CameraShared {
    /// Best-effort preview slot (non-authoritative)
    pub preview: PreviewSlot,
    /// Latest detection set, capacity-bounded
    pub detections: DetectionBoard,
    /// Worker frequency gauges
    pub capture_rate: RateGauge,
    pub record_rate: RateGauge,
    pub detect_rate: RateGauge,
}

impl CameraShared {
    fn new(detection_capacity: usize) -> Self {
        Self {
            preview: PreviewSlot::default(),
            detections: DetectionBoard::new(detection_capacity),
            capture_rate: RateGauge::default(),
            record_rate: RateGauge::default(),
            detect_rate: RateGauge::default(),
        }
    }
}

/// Channel endpoints created when a camera is registered.
///
/// The senders belong to the capture worker, the receivers to the
/// record and detect workers. Channels are unbounded on purpose (see
/// module docs).
pub struct CameraChannels {
    pub record_tx: Sender<Frame>,
    pub record_rx: Receiver<Frame>,
    pub detect_tx: Sender<Frame>,
    pub detect_rx: Receiver<Frame>,
}

/// Process-wide session state.
///
/// Created once at session start and shared (via `Arc`) by every
/// worker; torn down when the last worker exits.
pub struct SessionState {
    running: AtomicBool,
    recording: AtomicBool,
    recording_raw: AtomicBool,
    actuator_value: AtomicI64,
    cameras: RwLock<BTreeMap<String, Arc<CameraShared>>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            recording: AtomicBool::new(false),
            recording_raw: AtomicBool::new(true),
            actuator_value: AtomicI64::new(0),
            cameras: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a camera, creating its shared buffers and queues.
    pub fn register_camera(
        &self,
        camera_id: &str,
        detection_capacity: usize,
    ) -> (Arc<CameraShared>, CameraChannels) {
        let shared = Arc::new(CameraShared::new(detection_capacity));
        self.cameras
            .write()
            .unwrap()
            .insert(camera_id.to_string(), shared.clone());

        let (record_tx, record_rx) = crossbeam_channel::unbounded();
        let (detect_tx, detect_rx) = crossbeam_channel::unbounded();
        (
            shared,
            CameraChannels {
                record_tx,
                record_rx,
                detect_tx,
                detect_rx,
            },
        )
    }

    /// Shared resources of a registered camera.
    pub fn camera(&self, camera_id: &str) -> Option<Arc<CameraShared>> {
        self.cameras.read().unwrap().get(camera_id).cloned()
    }

    /// Registered camera ids, in sorted order.
    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.read().unwrap().keys().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cooperative shutdown of every worker.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    pub fn is_recording_raw(&self) -> bool {
        self.recording_raw.load(Ordering::SeqCst)
    }

    pub fn set_recording_raw(&self, recording_raw: bool) {
        self.recording_raw.store(recording_raw, Ordering::SeqCst);
    }

    /// Most recently confirmed actuator intensity, recorded alongside
    /// detections in the tracking metadata stream.
    pub fn actuator_value(&self) -> i64 {
        self.actuator_value.load(Ordering::SeqCst)
    }

    pub fn set_actuator_value(&self, value: i64) {
        self.actuator_value.store(value, Ordering::SeqCst);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
