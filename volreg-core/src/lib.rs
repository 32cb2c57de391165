//! # `volreg-core`
//!
//! This library provides the common types shared by the volumetric
//! registration crates: the dense 3D image container, keypoints with a full
//! local orientation frame, point correspondences, and the parametric
//! transform families the consensus layer fits. The crate is deliberately
//! small so that algorithm crates can depend on it without pulling in each
//! other.
//!
//! Conventions used throughout the workspace:
//!
//! * Voxel data is `f32`, normalized to `[0, 1]` by the caller.
//! * Geometry (keypoint positions, transforms) is `f64`.
//! * The coordinate origin is the corner of voxel `(0, 0, 0)`; +x is the
//!   fastest-varying axis in memory.

mod error;
mod image;
mod keypoint;
mod matches;
mod transform;

pub use error::*;
pub use image::*;
pub use keypoint::*;
pub use matches::*;
pub use nalgebra;
pub use transform::*;
