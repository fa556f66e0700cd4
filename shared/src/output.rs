//! Per-session output files.
//!
//! Column layouts are a compatibility contract: downstream analysis
//! reads these files by header name, so the row structs below must not
//! be reordered or renamed.

use crate::frame::{Detection, Frame};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// One row of `raw/<camera>.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrameRow {
    pub frame_number: u64,
    pub process_timestamp: f64,
    pub camera_timestamp: f64,
}

/// One row of `tracking/<camera>.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRow {
    pub frame_number: u64,
    pub process_timestamp: f64,
    pub camera_timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub area: f64,
    pub actuator_value: i64,
}

/// One row of `reconstruction/points.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointRow {
    pub frame_number: u64,
    pub point_id: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub reconstruction_error: f64,
}

/// One row of `reconstruction/tracked.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRow {
    pub frame_number: u64,
    pub target_id: u64,
    pub n_missed_observations: u64,
    pub x: f64,
    pub x_variance: f64,
    pub x_velocity: f64,
    pub y: f64,
    pub y_variance: f64,
    pub y_velocity: f64,
    pub z: f64,
    pub z_variance: f64,
    pub z_velocity: f64,
}

impl TrackingRow {
    /// Build a tracking row for one detection of one frame.
    pub fn from_detection(frame: &Frame, detection: &Detection, actuator_value: i64) -> Self {
        Self {
            frame_number: frame.frame_index,
            process_timestamp: frame.process_timestamp.as_secs_f64(),
            camera_timestamp: frame.capture_timestamp.as_secs_f64(),
            x: detection.x,
            y: detection.y,
            area: detection.area,
            actuator_value,
        }
    }
}

/// Well-known paths inside a session data directory.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    root: PathBuf,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_video(&self, camera_id: &str) -> PathBuf {
        self.root.join("raw").join(format!("{camera_id}.video"))
    }

    pub fn raw_csv(&self, camera_id: &str) -> PathBuf {
        self.root.join("raw").join(format!("{camera_id}.csv"))
    }

    pub fn tracking_csv(&self, camera_id: &str) -> PathBuf {
        self.root.join("tracking").join(format!("{camera_id}.csv"))
    }

    pub fn tracking_dir(&self) -> PathBuf {
        self.root.join("tracking")
    }

    pub fn camera_rig(&self) -> PathBuf {
        self.root.join("camera_rig.json")
    }

    pub fn points_csv(&self) -> PathBuf {
        self.root.join("reconstruction").join("points.csv")
    }

    pub fn tracked_csv(&self) -> PathBuf {
        self.root.join("reconstruction").join("tracked.csv")
    }
}

/// Open a CSV writer, creating parent directories as needed.
pub fn create_csv_writer(path: &Path) -> io::Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(csv::Writer::from_writer(File::create(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_paths_layout() {
        let paths = SessionPaths::new("/data/session1");
        assert_eq!(
            paths.raw_video("cam0"),
            PathBuf::from("/data/session1/raw/cam0.video")
        );
        assert_eq!(
            paths.raw_csv("cam0"),
            PathBuf::from("/data/session1/raw/cam0.csv")
        );
        assert_eq!(
            paths.tracking_csv("cam1"),
            PathBuf::from("/data/session1/tracking/cam1.csv")
        );
        assert_eq!(
            paths.points_csv(),
            PathBuf::from("/data/session1/reconstruction/points.csv")
        );
        assert_eq!(
            paths.tracked_csv(),
            PathBuf::from("/data/session1/reconstruction/tracked.csv")
        );
    }

    #[test]
    fn test_tracking_csv_header_contract() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracking/cam0.csv");
        let mut writer = create_csv_writer(&path).unwrap();
        writer
            .serialize(TrackingRow {
                frame_number: 1,
                process_timestamp: 0.5,
                camera_timestamp: 0.25,
                x: 10.0,
                y: 20.0,
                area: 4.0,
                actuator_value: 0,
            })
            .unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(
            header,
            "frame_number,process_timestamp,camera_timestamp,x,y,area,actuator_value"
        );
    }

    #[test]
    fn test_tracked_csv_header_contract() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracked.csv");
        let mut writer = create_csv_writer(&path).unwrap();
        writer
            .serialize(TrackedRow {
                frame_number: 0,
                target_id: 1,
                n_missed_observations: 0,
                x: 0.0,
                x_variance: 0.0,
                x_velocity: 0.0,
                y: 0.0,
                y_variance: 0.0,
                y_velocity: 0.0,
                z: 0.0,
                z_variance: 0.0,
                z_velocity: 0.0,
            })
            .unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(
            header,
            "frame_number,target_id,n_missed_observations,\
             x,x_variance,x_velocity,y,y_variance,y_velocity,z,z_variance,z_velocity"
        );
    }

    #[test]
    fn test_point_row_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("points.csv");
        let mut writer = create_csv_writer(&path).unwrap();
        let row = PointRow {
            frame_number: 7,
            point_id: 0,
            x: 1.0,
            y: -2.0,
            z: 3.5,
            reconstruction_error: 0.125,
        };
        writer.serialize(row.clone()).unwrap();
        writer.flush().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let parsed: PointRow = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(parsed.frame_number, row.frame_number);
        assert_eq!(parsed.reconstruction_error, row.reconstruction_error);
    }
}
