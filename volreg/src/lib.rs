//! # `volreg`
//!
//! Batteries-included feature-based registration of volumetric scalar
//! images. Given a *source* and a *reference* volume, [`register`] detects
//! scale- and rotation-covariant keypoints in each with [`sift3d`], matches
//! their descriptors with a ratio test and cross-check, robustly fits an
//! affine transform with seeded RANSAC, and returns the transform aligning
//! the source to the reference. [`transform_volume`] then resamples a
//! volume under any fitted transform.
//!
//! All of the core registration types live in [`volreg_core`] and are
//! re-exported at the root of this crate. Modules group the algorithm
//! crates by purpose:
//!
//! * [`feature`] - keypoint detection, description, and matching
//! * [`consensus`] - robust model estimation from noisy matches

pub use volreg_core::*;

/// Feature detection, description, and matching.
pub mod feature {
    pub use sift3d::*;
}

/// Consensus algorithms (RANSAC).
pub mod consensus {
    pub use volreg_ransac::Ransac;
}

mod config;
mod pipeline;
mod resample;
mod tform_io;

pub use config::Registration;
pub use pipeline::register;
pub use resample::transform_volume;
pub use tform_io::{read_affine, write_affine};
