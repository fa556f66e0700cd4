//! Simulated online session.
//!
//! Wires the real capture/record/detect workers to scripted mock
//! cameras observing a synthetic target orbiting the origin. Produces
//! the same session directory layout as a hardware run (`raw/`,
//! `tracking/`, `camera_rig.json`), so the offline batch commands can
//! be pointed straight at it.

use anyhow::{Context, Result};
use nalgebra::Point3;
use ndarray::Array2;
use reconstruct::test_fixtures::standard_rig;
use reconstruct::CameraRig;
use shared::camera_interface::mock::MockCamera;
use shared::config::{DetectionConfig, SessionConfig};
use shared::output::{create_csv_writer, SessionPaths};
use shared::pipeline::capture::CaptureWorker;
use shared::pipeline::detect::DetectionWorker;
use shared::pipeline::record::{NullVideoSink, RecordWorker};
use shared::pipeline::SessionState;
use std::path::Path;
use std::sync::Arc;

const FRAME_WIDTH: usize = 640;
const FRAME_HEIGHT: usize = 480;
const BACKGROUND_LEVEL: u8 = 10;
const TARGET_LEVEL: u8 = 200;

/// Options for `rig run`.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub cameras: usize,
    pub frames: usize,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            cameras: 3,
            frames: 100,
        }
    }
}

/// Synthetic target position at one simulation step: a slow orbit with
/// a vertical bob, well inside every camera's field of view.
pub fn target_position(step: usize, total: usize) -> Point3<f64> {
    let phase = step as f64 / total as f64 * std::f64::consts::TAU;
    Point3::new(0.2 * phase.cos(), 0.2 * phase.sin(), 0.05 * (2.0 * phase).sin())
}

/// Paint a square target spot into a uniform background frame.
fn render_frame(spot: Option<(f64, f64)>) -> Array2<u8> {
    let mut pixels = Array2::from_elem((FRAME_HEIGHT, FRAME_WIDTH), BACKGROUND_LEVEL);
    if let Some((x, y)) = spot {
        let col = x.round() as isize;
        let row = y.round() as isize;
        for dr in -1..=1isize {
            for dc in -1..=1isize {
                let r = row + dr;
                let c = col + dc;
                if (0..FRAME_HEIGHT as isize).contains(&r) && (0..FRAME_WIDTH as isize).contains(&c)
                {
                    pixels[[r as usize, c as usize]] = TARGET_LEVEL;
                }
            }
        }
    }
    pixels
}

/// Run a complete simulated session into `data_dir`.
///
/// Spawns one capture, one record and one detect worker per camera;
/// the session ends when the frame scripts are exhausted and every
/// worker has drained and flushed.
pub fn run_session(data_dir: &Path, options: &SimulateOptions) -> Result<()> {
    let config = SessionConfig {
        data_dir: data_dir.to_path_buf(),
        framerate: 100.0,
        // The detect threshold sits well above the background ghosting
        // a slow EMA leaves behind a moving spot, and well below the
        // spot contrast itself.
        detection: DetectionConfig {
            alpha: 0.05,
            threshold: 40.0,
            max_detections: 20,
        },
    };
    let paths = SessionPaths::new(&config.data_dir);
    let detection = &config.detection;
    let cameras = standard_rig(options.cameras);

    let state = Arc::new(SessionState::new());
    state.set_recording(true);

    let mut handles = Vec::new();
    for camera_model in &cameras {
        let camera_id = camera_model.name().to_string();

        // Scripted frames: one seed frame without the target, then the
        // projected orbit.
        let mut frames = vec![render_frame(None)];
        for step in 0..options.frames {
            let projected = camera_model.project(&target_position(step, options.frames));
            frames.push(render_frame(Some((projected.x, projected.y))));
        }

        let (shared, channels) = state.register_camera(&camera_id, detection.max_detections);

        let capture = CaptureWorker::new(
            Box::new(MockCamera::new(camera_id.clone(), frames)),
            state.clone(),
            shared.clone(),
            channels.record_tx,
            channels.detect_tx,
        );

        let record = RecordWorker::new(
            &camera_id,
            state.clone(),
            shared.clone(),
            channels.record_rx,
            Box::new(NullVideoSink::default()),
            create_csv_writer(&paths.raw_csv(&camera_id))?,
        );

        let detect = DetectionWorker::new(
            &camera_id,
            detection,
            state.clone(),
            shared.clone(),
            channels.detect_rx,
            create_csv_writer(&paths.tracking_csv(&camera_id))?,
        );

        handles.push(capture.spawn());
        handles.push(record.spawn());
        handles.push(detect.spawn());
    }

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    }
    state.request_shutdown();

    CameraRig::from_models(cameras)
        .save_json_file(&paths.camera_rig())
        .context("saving simulated camera rig")?;

    tracing::info!(
        "simulated session with {} cameras / {} frames written to {}",
        options.cameras,
        options.frames,
        data_dir.display()
    );
    Ok(())
}
