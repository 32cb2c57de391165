use derive_more::{Deref, DerefMut};
use nalgebra::{Point3, Rotation3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A scale- and rotation-covariant interest point in a volume.
///
/// The position is sub-voxel and always expressed in the base (octave-0
/// input) frame, so a keypoint never references the pyramid it was detected
/// in and the pyramid may be released as soon as detection finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Keypoint {
    /// Sub-voxel position in base-frame voxel coordinates.
    pub point: Point3<f64>,

    /// The pyramid octave the keypoint was detected in. Octave 0 is the
    /// 2x-upsampled input, so base-frame coordinates are octave-`o`
    /// coordinates scaled by `2^(o - 1)`.
    pub octave: usize,

    /// Sub-level within the octave, refined to sub-level precision.
    pub sublevel: f64,

    /// Absolute scale in base-frame voxel units:
    /// `sigma = sigma0 * 2^(octave + sublevel / num_intervals)`.
    pub sigma: f64,

    /// The dominant local frame: a right-handed orthonormal basis whose
    /// columns are the structure-tensor eigenvectors, strongest first.
    pub frame: Rotation3<f64>,
}

/// An append-only, growable collection of keypoints.
#[derive(Debug, Clone, Default, Deref, DerefMut)]
pub struct KeypointStore(pub Vec<Keypoint>);

impl KeypointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, keypoint: Keypoint) {
        self.0.push(keypoint);
    }
}

impl FromIterator<Keypoint> for KeypointStore {
    fn from_iter<I: IntoIterator<Item = Keypoint>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
