//! Offline batch reconstruction and tracking.
//!
//! Both commands operate on a session data directory. Reconstruction is
//! embarrassingly parallel over disjoint frame ranges: the frame set is
//! split into contiguous chunks, each chunk runs through its own engine
//! on a worker, and results are merged back in frame order. Tracking is
//! strictly sequential (state carries across frames).

use anyhow::{bail, Context, Result};
use nalgebra::{Point2, Point3};
use rayon::prelude::*;
use reconstruct::{CameraRig, CorrespondenceEngine, EngineConfig, Point3D};
use shared::output::{create_csv_writer, PointRow, SessionPaths, TrackedRow, TrackingRow};
use std::collections::BTreeMap;
use std::path::Path;
use track::{Tracker, TrackerConfig};

/// Options for `rig reconstruct`.
#[derive(Debug, Clone)]
pub struct ReconstructOptions {
    /// Drop detections with area at or below this value
    pub area_filter: f64,
    /// Minimum number of observing cameras per output point
    pub minimum_views: usize,
    /// Inclusive frame range; None covers everything present
    pub frame_range: Option<(u64, u64)>,
    /// Worker count for the frame-range partition
    pub workers: usize,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            area_filter: 0.0,
            minimum_views: 3,
            frame_range: None,
            workers: 4,
        }
    }
}

/// Options for `rig track`.
#[derive(Debug, Clone)]
pub struct TrackOptions {
    /// Inclusive frame range; None covers everything present
    pub range: Option<(u64, u64)>,
    /// Drop reconstructed points at or above this diagnostic error
    pub max_reconstruction_error: f64,
    /// Association distance gate
    pub max_distance: f64,
    /// Missed-observation ceiling
    pub max_missed: u64,
    /// Kalman timestep
    pub dt: f64,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            range: None,
            max_reconstruction_error: 5.0,
            max_distance: 1.0,
            max_missed: 20,
            dt: 0.01,
        }
    }
}

/// Per-frame detections for every rig camera, in rig order.
type FrameObservations = BTreeMap<u64, Vec<Vec<Point2<f64>>>>;

/// Load per-camera tracking CSVs into per-frame observation lists.
///
/// Every rig camera must have a tracking file, and every tracking file
/// must belong to a rig camera; a calibration/data mismatch is fatal
/// here, before any reconstruction work starts.
fn load_observations(
    paths: &SessionPaths,
    rig: &CameraRig,
    options: &ReconstructOptions,
) -> Result<FrameObservations> {
    let camera_count = rig.models().len();

    // Data files with no calibration model are never silently skipped
    let tracking_dir = paths.tracking_dir();
    let mut data_cameras = Vec::new();
    for entry in std::fs::read_dir(&tracking_dir)
        .with_context(|| format!("no tracking data at {}", tracking_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            data_cameras.push(stem.to_string());
        }
    }
    rig.require(&data_cameras)?;

    let mut frames: FrameObservations = BTreeMap::new();
    for (camera_index, name) in rig.names().iter().enumerate() {
        let path = paths.tracking_csv(name);
        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("no tracking data for camera '{name}'"))?;

        for row in reader.deserialize() {
            let row: TrackingRow = row.with_context(|| format!("bad row in {}", path.display()))?;
            if row.area <= options.area_filter {
                continue;
            }
            if let Some((start, stop)) = options.frame_range {
                if row.frame_number < start || row.frame_number > stop {
                    continue;
                }
            }
            frames
                .entry(row.frame_number)
                .or_insert_with(|| vec![Vec::new(); camera_count])[camera_index]
                .push(Point2::new(row.x, row.y));
        }
    }

    Ok(frames)
}

/// Run batch reconstruction over a session directory, producing
/// `reconstruction/points.csv`.
pub fn run_reconstruction(data_dir: &Path, options: &ReconstructOptions) -> Result<()> {
    let paths = SessionPaths::new(data_dir);

    let rig = CameraRig::from_json_file(&paths.camera_rig())
        .with_context(|| format!("loading calibration from {}", paths.camera_rig().display()))?;
    tracing::info!("loaded camera rig with {} cameras", rig.models().len());

    let frames = load_observations(&paths, &rig, options)?;
    if frames.is_empty() {
        bail!("no detections to reconstruct");
    }
    tracing::info!("reconstructing {} frames", frames.len());

    let engine_config = EngineConfig {
        minimum_views: options.minimum_views,
        ..EngineConfig::default()
    };
    // Validate camera count before fanning out
    CorrespondenceEngine::new(rig.models().iter().collect(), engine_config.clone())?;

    // Disjoint contiguous frame chunks, merged back in order
    let frame_list: Vec<(u64, Vec<Vec<Point2<f64>>>)> = frames.into_iter().collect();
    let chunk_size = frame_list.len().div_ceil(options.workers.max(1));

    let reconstructed: Vec<Vec<(u64, Vec<Point3D>)>> = frame_list
        .par_chunks(chunk_size)
        .map(|chunk| {
            let engine = CorrespondenceEngine::new(
                rig.models().iter().collect(),
                engine_config.clone(),
            )
            .expect("camera count already validated");

            chunk
                .iter()
                .map(|(frame_number, observations)| {
                    let points = engine
                        .reconstruct(observations)
                        .expect("view lists are built per rig camera");
                    (*frame_number, points)
                })
                .collect()
        })
        .collect();

    let mut writer = create_csv_writer(&paths.points_csv())?;
    let mut total_points = 0u64;
    for (frame_number, points) in reconstructed.into_iter().flatten() {
        for (point_id, point) in points.iter().enumerate() {
            writer.serialize(PointRow {
                frame_number,
                point_id: point_id as u64,
                x: point.x,
                y: point.y,
                z: point.z,
                reconstruction_error: point.reconstruction_error,
            })?;
            total_points += 1;
        }
    }
    writer.flush()?;

    tracing::info!(
        "wrote {} points to {}",
        total_points,
        paths.points_csv().display()
    );
    Ok(())
}

/// Run batch tracking over `reconstruction/points.csv`, producing
/// `reconstruction/tracked.csv`.
pub fn run_tracking(data_dir: &Path, options: &TrackOptions) -> Result<()> {
    let paths = SessionPaths::new(data_dir);

    let mut reader = csv::Reader::from_path(paths.points_csv())
        .with_context(|| format!("no reconstruction at {}", paths.points_csv().display()))?;

    let mut frames: BTreeMap<u64, Vec<Point3<f64>>> = BTreeMap::new();
    for row in reader.deserialize() {
        let row: PointRow = row.context("bad row in points.csv")?;
        if row.reconstruction_error >= options.max_reconstruction_error {
            continue;
        }
        frames
            .entry(row.frame_number)
            .or_default()
            .push(Point3::new(row.x, row.y, row.z));
    }
    if frames.is_empty() {
        bail!("no reconstructed points to track");
    }

    if let Some(parent) = paths.tracked_csv().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let output = std::fs::File::create(paths.tracked_csv())?;

    let mut tracker = Tracker::new(TrackerConfig {
        dt: options.dt,
        max_distance: options.max_distance,
        max_missed: options.max_missed,
        max_covariance: f64::INFINITY,
    })
    .with_output(Box::new(output));

    let (start, stop) = match options.range {
        Some((start, stop)) => (Some(start), Some(stop)),
        None => (None, None),
    };
    tracker.process_batch(&frames, start, stop)?;
    tracker.finish()?;

    tracing::info!("wrote tracks to {}", paths.tracked_csv().display());
    Ok(())
}

/// Read `reconstruction/tracked.csv` back (used by tests and tooling).
pub fn read_tracked(data_dir: &Path) -> Result<Vec<TrackedRow>> {
    let paths = SessionPaths::new(data_dir);
    let mut reader = csv::Reader::from_path(paths.tracked_csv())?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.context("bad row in tracked.csv")?);
    }
    Ok(rows)
}

/// Read `reconstruction/points.csv` back (used by tests and tooling).
pub fn read_points(data_dir: &Path) -> Result<Vec<PointRow>> {
    let paths = SessionPaths::new(data_dir);
    let mut reader = csv::Reader::from_path(paths.points_csv())?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.context("bad row in points.csv")?);
    }
    Ok(rows)
}
