//! Shared components for the volumetric tracking rig.
//!
//! This crate contains the data model, hardware seams and per-camera
//! processing used by every other part of the system: frames and
//! timestamps, the camera and actuator interfaces, background
//! subtraction and blob extraction, the session state that ties the
//! capture/record/detect workers together, and the CSV output
//! contracts.

pub mod actuator;
pub mod algo;
pub mod camera_interface;
pub mod config;
pub mod frame;
pub mod image_proc;
pub mod output;
pub mod pipeline;
pub mod timestamp;
