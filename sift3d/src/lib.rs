//! # `sift3d`
//!
//! Scale- and rotation-covariant keypoint detection and description for
//! volumetric scalar images, the 3D analogue of SIFT. The pipeline builds a
//! Gaussian/DoG scale-space pyramid, localizes DoG extrema with sub-voxel
//! refinement, assigns each keypoint a full 3D orientation frame from the
//! eigenvectors of a local gradient structure tensor, and extracts
//! gradient-orientation histograms binned over an icosahedral tessellation
//! of the sphere.
//!
//! The entry point is the [`Sift3d`] configuration struct:
//!
//! ```
//! use sift3d::Sift3d;
//! use volreg_core::Image;
//!
//! let volume = Image::new_scalar(16, 16, 16).unwrap();
//! let (keypoints, descriptors) = Sift3d::default().extract(&volume).unwrap();
//! assert_eq!(keypoints.len(), descriptors.len()); // a flat volume has none
//! ```

mod extrema;
mod orientation;

pub mod descriptor;
pub mod filter;
pub mod matching;
pub mod mesh;
pub mod pyramid;

pub use descriptor::{Descriptor, DescriptorStore};
pub use mesh::OrientationMesh;
pub use pyramid::{Level, Pyramid};

use crate::filter::scalar_channel;
use log::*;
use volreg_core::{Error, Image, KeypointStore, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Contains the configuration parameters of the 3D SIFT detector and
/// descriptor extractor.
///
/// The most important parameter to pay attention to is `peak_thresh`, the
/// DoG contrast floor below which candidate extrema are discarded.
/// [`Sift3d::new`] can be used to set this threshold and let all other
/// parameters remain default.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sift3d {
    /// DoG contrast floor for candidate extrema, on unit-range data.
    pub peak_thresh: f64,

    /// Edge rejection ratio `r`: candidates with
    /// `tr(H)^2 / det(H) >= (r + 1)^2 / r` are discarded.
    pub edge_thresh: f64,

    /// Number of DoG intervals per octave; each octave holds
    /// `num_intervals + 3` Gaussian levels.
    pub num_intervals: usize,

    /// Absolute blur of the base level of octave 0 (sigma units).
    pub sigma0: f64,

    /// Nominal blur assumed already present in the input.
    pub sigma_n: f64,

    /// Number of octaves, or `None` to pick the largest count keeping the
    /// smallest dimension of the last octave at least 8 voxels.
    pub num_octaves: Option<usize>,

    /// Subdivision level of the icosahedral orientation tessellation.
    /// Level 1 gives 42 orientation bins per spatial bin.
    pub icosahedron_subdivisions: usize,

    /// Collapse the 4x4x4 spatial grid into a single bin, keeping only the
    /// orientation histogram of the whole support region.
    pub dense_histogram: bool,
}

impl Default for Sift3d {
    fn default() -> Self {
        Self {
            peak_thresh: 0.04,
            edge_thresh: 10.0,
            num_intervals: 3,
            sigma0: 1.6,
            sigma_n: 0.5,
            num_octaves: None,
            icosahedron_subdivisions: 1,
            dense_histogram: false,
        }
    }
}

impl Sift3d {
    /// This convenience constructor is provided for the very common case
    /// that the contrast threshold needs to be modified.
    pub fn new(peak_thresh: f64) -> Self {
        Self {
            peak_thresh,
            ..Default::default()
        }
    }

    /// Detect keypoints without extracting descriptors.
    ///
    /// Builds the scale space, scans the DoG for extrema, and assigns
    /// orientations. The pyramid is released before returning; keypoints
    /// are self-contained.
    pub fn detect(&self, image: &Image) -> Result<KeypointStore> {
        let scalar = self.prepare(image)?;
        let gss = self.build_gaussian_pyramid(&scalar)?;
        let dog = self.build_dog_pyramid(&gss);
        Ok(self.detect_keypoints(&gss, &dog))
    }

    /// Detect keypoints and extract their descriptors, end-to-end.
    ///
    /// Returns the keypoints in deterministic scan order and one descriptor
    /// per keypoint that survives extraction; each descriptor records the
    /// index of its keypoint.
    pub fn extract(&self, image: &Image) -> Result<(KeypointStore, DescriptorStore)> {
        let scalar = self.prepare(image)?;
        trace!("Building scale space.");
        let gss = self.build_gaussian_pyramid(&scalar)?;
        let dog = self.build_dog_pyramid(&gss);
        trace!("Detecting keypoints.");
        let keypoints = self.detect_keypoints(&gss, &dog);
        info!("Detected {} keypoints.", keypoints.len());
        let mesh = OrientationMesh::new(self.icosahedron_subdivisions);
        let descriptors = self.extract_descriptors(&gss, &keypoints, &mesh);
        info!("Extracted {} descriptors.", descriptors.len());
        Ok((keypoints, descriptors))
    }

    /// Validate the input and reduce it to the channel the pipeline reads.
    fn prepare(&self, image: &Image) -> Result<Image> {
        if image.min_dim() < 4 {
            return Err(Error::BadDimensions {
                got: (image.nx(), image.ny(), image.nz(), image.nc()),
                requirement: "each spatial dimension must be at least 4 voxels",
            });
        }
        Ok(scalar_channel(image))
    }
}
