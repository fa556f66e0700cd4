//! Synthetic camera rigs for tests and simulation.
//!
//! Shared by this crate's unit tests, the end-to-end suites and the
//! simulated pipeline runner; not part of the production data path.

use crate::camera_model::CameraModel;
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point3, Vector3};

/// Build a pinhole camera at `eye` looking at `target`.
///
/// Standard computer-vision convention: camera z forward, x right,
/// y down; `P = K [R | -R eye]`.
pub fn pinhole_camera(
    name: &str,
    eye: Point3<f64>,
    target: Point3<f64>,
    focal: f64,
    principal_point: (f64, f64),
) -> CameraModel {
    let forward = (target - eye).normalize();

    // Pick an up reference not parallel to the optical axis
    let up = if forward.z.abs() > 0.99 {
        Vector3::new(0.0, 1.0, 0.0)
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    };

    let right = up.cross(&forward).normalize();
    let down = forward.cross(&right);

    let rotation = Matrix3::from_rows(&[
        right.transpose(),
        down.transpose(),
        forward.transpose(),
    ]);
    let translation = -rotation * eye.coords;

    let intrinsics = Matrix3::new(
        focal,
        0.0,
        principal_point.0,
        0.0,
        focal,
        principal_point.1,
        0.0,
        0.0,
        1.0,
    );

    let mut extrinsics = Matrix4::identity();
    extrinsics.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
    extrinsics
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&translation);

    let projection: Matrix3x4<f64> =
        intrinsics * extrinsics.fixed_view::<3, 4>(0, 0).into_owned();

    CameraModel::new(name, projection).with_intrinsics(intrinsics)
}

/// A well-conditioned rig of up to six cameras surrounding the origin.
///
/// Viewpoints are spread so no two optical axes are collinear, which
/// keeps every camera pair usable for two-view triangulation.
pub fn standard_rig(count: usize) -> Vec<CameraModel> {
    let positions = [
        Point3::new(5.0, 0.5, 1.2),
        Point3::new(-0.5, 5.0, 1.6),
        Point3::new(-4.5, -1.0, 2.0),
        Point3::new(1.0, -5.0, 1.4),
        Point3::new(3.5, 3.5, 2.5),
        Point3::new(-3.0, 3.0, 0.8),
    ];
    assert!(count <= positions.len(), "standard_rig supports up to 6 cameras");

    positions[..count]
        .iter()
        .enumerate()
        .map(|(idx, &eye)| {
            pinhole_camera(
                &format!("cam{idx}"),
                eye,
                Point3::origin(),
                1000.0,
                (320.0, 240.0),
            )
        })
        .collect()
}
