//! Calibrated camera models and multi-view triangulation.
//!
//! Models are produced by the external calibration procedure (which
//! guarantees <5 px mean reprojection error before handing them over)
//! and are immutable for the whole session. The engine only consumes
//! them: project 3D to 2D, undistort observations, triangulate rays.

use nalgebra::{DMatrix, Matrix3, Matrix3x4, Point2, Point3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from reconstruction and calibration loading.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    /// The exhaustive ordering search is factorial in camera count;
    /// exceeding the ceiling fails loudly instead of silently stalling.
    #[error("camera count {count} exceeds the configured ceiling of {max}")]
    TooManyCameras { count: usize, max: usize },

    #[error("at least two camera models are required, got {count}")]
    TooFewCameras { count: usize },

    #[error("expected detection lists for {cameras} cameras, got {views}")]
    ViewCountMismatch { cameras: usize, views: usize },

    /// A camera id present in the data has no calibration model.
    /// Fatal at batch start; cameras are never silently skipped.
    #[error("no camera model for expected camera id '{id}'")]
    MissingCamera { id: String },

    #[error("failed to read camera rig: {0}")]
    RigIo(#[from] std::io::Error),

    #[error("failed to parse camera rig: {0}")]
    RigFormat(#[from] serde_json::Error),
}

/// Brown-Conrady lens distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }
}

/// A calibrated camera: 3x4 projection matrix plus distortion.
///
/// The projection matrix maps homogeneous world points to homogeneous
/// pixel coordinates. Distortion correction additionally needs the
/// intrinsic matrix to move between pixel and normalized coordinates;
/// models without intrinsics are treated as distortion-free.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    name: String,
    projection: Matrix3x4<f64>,
    intrinsics: Option<Matrix3<f64>>,
    distortion: Distortion,
}

impl CameraModel {
    pub fn new(name: impl Into<String>, projection: Matrix3x4<f64>) -> Self {
        Self {
            name: name.into(),
            projection,
            intrinsics: None,
            distortion: Distortion::default(),
        }
    }

    pub fn with_intrinsics(mut self, intrinsics: Matrix3<f64>) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn projection(&self) -> &Matrix3x4<f64> {
        &self.projection
    }

    /// Project a world point to (undistorted) pixel coordinates.
    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let ph = self.projection * point.to_homogeneous();
        Point2::new(ph.x / ph.z, ph.y / ph.z)
    }

    /// Remove lens distortion from an observed pixel position.
    ///
    /// Uses the standard fixed-point inversion of the Brown-Conrady
    /// forward model in normalized coordinates. Identity for models
    /// without distortion or intrinsics.
    pub fn undistort(&self, observed: Point2<f64>) -> Point2<f64> {
        let (Some(k), false) = (self.intrinsics, self.distortion.is_zero()) else {
            return observed;
        };
        let Some(k_inv) = k.try_inverse() else {
            return observed;
        };

        let normalized = k_inv * observed.to_homogeneous();
        let xd = normalized.x / normalized.z;
        let yd = normalized.y / normalized.z;

        let d = &self.distortion;
        let mut x = xd;
        let mut y = yd;
        for _ in 0..8 {
            let r2 = x * x + y * y;
            let radial = 1.0 + d.k1 * r2 + d.k2 * r2 * r2 + d.k3 * r2 * r2 * r2;
            let dx = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
            let dy = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
            x = (xd - dx) / radial;
            y = (yd - dy) / radial;
        }

        let pixel = k * nalgebra::Vector3::new(x, y, 1.0);
        Point2::new(pixel.x / pixel.z, pixel.y / pixel.z)
    }
}

/// Distance between an observation and the projection of a 3D estimate.
pub fn reprojection_error(
    camera: &CameraModel,
    observed: &Point2<f64>,
    point: &Point3<f64>,
) -> f64 {
    (camera.project(point) - observed).norm()
}

/// Multi-view linear triangulation.
///
/// Builds the standard direct-linear-transform system (two rows per
/// view) and takes the right singular vector of the smallest singular
/// value. Returns None for fewer than two views or a solution at
/// infinity.
pub fn triangulate(views: &[(&CameraModel, Point2<f64>)]) -> Option<Point3<f64>> {
    if views.len() < 2 {
        return None;
    }

    let mut design = DMatrix::zeros(2 * views.len(), 4);
    for (idx, (camera, point)) in views.iter().enumerate() {
        let p = camera.projection();
        for col in 0..4 {
            design[(2 * idx, col)] = point.x * p[(2, col)] - p[(0, col)];
            design[(2 * idx + 1, col)] = point.y * p[(2, col)] - p[(1, col)];
        }
    }

    let svd = design.svd(false, true);
    let v_t = svd.v_t?;

    let mut min_idx = 0;
    for (i, &value) in svd.singular_values.iter().enumerate() {
        if value < svd.singular_values[min_idx] {
            min_idx = i;
        }
    }

    let h = v_t.row(min_idx);
    if h[3].abs() < 1e-12 {
        return None;
    }
    Some(Point3::new(h[0] / h[3], h[1] / h[3], h[2] / h[3]))
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCameraModel {
    name: String,
    projection: [[f64; 4]; 3],
    #[serde(default)]
    intrinsics: Option<[[f64; 3]; 3]>,
    #[serde(default)]
    distortion: Distortion,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCameraRig {
    cameras: Vec<StoredCameraModel>,
}

/// The full calibrated camera set for one session.
///
/// Camera order is the file/registration order and defines the view
/// order used throughout reconstruction.
#[derive(Debug, Clone)]
pub struct CameraRig {
    cameras: Vec<CameraModel>,
}

impl CameraRig {
    pub fn from_models(cameras: Vec<CameraModel>) -> Self {
        Self { cameras }
    }

    /// Load a rig from the calibration collaborator's JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ReconstructionError> {
        let contents = std::fs::read_to_string(path)?;
        let stored: StoredCameraRig = serde_json::from_str(&contents)?;

        let cameras = stored
            .cameras
            .into_iter()
            .map(|c| {
                let projection = Matrix3x4::from_fn(|i, j| c.projection[i][j]);
                let mut model =
                    CameraModel::new(c.name, projection).with_distortion(c.distortion);
                if let Some(k) = c.intrinsics {
                    model = model.with_intrinsics(Matrix3::from_fn(|i, j| k[i][j]));
                }
                model
            })
            .collect();

        Ok(Self { cameras })
    }

    /// Save the rig back to JSON (used by simulation tooling).
    pub fn save_json_file(&self, path: &Path) -> Result<(), ReconstructionError> {
        let stored = StoredCameraRig {
            cameras: self
                .cameras
                .iter()
                .map(|m| StoredCameraModel {
                    name: m.name.clone(),
                    projection: std::array::from_fn(|i| {
                        std::array::from_fn(|j| m.projection[(i, j)])
                    }),
                    intrinsics: m
                        .intrinsics
                        .map(|k| std::array::from_fn(|i| std::array::from_fn(|j| k[(i, j)]))),
                    distortion: m.distortion,
                })
                .collect(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }

    pub fn models(&self) -> &[CameraModel] {
        &self.cameras
    }

    pub fn names(&self) -> Vec<&str> {
        self.cameras.iter().map(|c| c.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&CameraModel> {
        self.cameras.iter().find(|c| c.name() == name)
    }

    /// Look up models for every listed camera id, failing loudly on
    /// the first id without a model.
    pub fn require(&self, ids: &[String]) -> Result<Vec<&CameraModel>, ReconstructionError> {
        ids.iter()
            .map(|id| {
                self.get(id).ok_or_else(|| ReconstructionError::MissingCamera {
                    id: id.clone(),
                })
            })
            .collect()
    }
}
