//! Per-camera image processing: background subtraction and blob
//! extraction.
//!
//! The detection path is deliberately simple: an exponential moving
//! average background model, a fixed binary threshold, 8-connected
//! component labeling, and moment-based centroiding. Targets are small
//! bright-or-dark spots against a mostly static scene, so this runs
//! comfortably at camera rate.

pub mod background;
pub mod labeling;

pub use background::BackgroundModel;
pub use labeling::{component_moments, connected_components, ComponentMoments};

use crate::frame::{Detection, Frame};
use ndarray::ArrayView2;

/// Extract detections from a binary foreground mask.
///
/// Components are emitted in discovery order (row-major scan order of
/// their first pixel), not sorted by area; consumers must not assume
/// any ordering.
pub fn extract_detections(frame: &Frame, mask: &ArrayView2<bool>) -> Vec<Detection> {
    let labels = connected_components(mask);
    component_moments(&labels.view())
        .into_iter()
        .map(|m| Detection {
            camera_id: frame.camera_id.clone(),
            frame_index: frame.frame_index,
            x: m.cx,
            y: m.cy,
            area: m.area,
        })
        .collect()
}
