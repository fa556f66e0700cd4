//! Cross-camera correspondence and 3D reconstruction.
//!
//! Given per-camera 2D detections for one time instant and a set of
//! calibrated camera models, this crate finds the best-supported
//! partition of the detections into 3D points and triangulates them.
//! The correspondence search is exhaustive over camera processing
//! orders: camera counts are physically small, and a configuration
//! ceiling rejects anything outside that assumption.

pub mod camera_model;
pub mod engine;
pub mod test_fixtures;

pub use camera_model::{
    reprojection_error, triangulate, CameraModel, CameraRig, Distortion, ReconstructionError,
};
pub use engine::{CorrespondenceEngine, EngineConfig, Point3D};
