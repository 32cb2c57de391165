use sift3d::Sift3d;

/// Contains the configuration parameters of the end-to-end registration
/// pipeline: the feature parameters plus matching and consensus settings.
///
/// The defaults are the standard operating point; the parameters most worth
/// tuning are `nn_thresh` (stricter values keep fewer, more distinctive
/// matches) and `err_thresh` (the inlier radius in voxels of the reference
/// frame).
#[derive(Debug, Copy, Clone)]
pub struct Registration {
    /// Feature detection and description parameters.
    pub sift: Sift3d,

    /// Ratio-test threshold: the nearest reference descriptor is accepted
    /// when closer than `nn_thresh` times the second nearest.
    pub nn_thresh: f32,

    /// Fraction of matches that must agree with the winning transform.
    pub min_inlier_ratio: f64,

    /// Inlier distance threshold of the consensus loop, in voxels.
    pub err_thresh: f64,

    /// Number of consensus iterations; bounds the runtime exactly.
    pub num_iter: usize,

    /// Seed of the consensus sampler. Identical seed and inputs give
    /// bit-identical transforms.
    pub seed: u64,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            sift: Sift3d::default(),
            nn_thresh: 0.8,
            min_inlier_ratio: 0.001,
            err_thresh: 5.0,
            num_iter: 500,
            seed: 0,
        }
    }
}

impl Registration {
    /// A configuration with everything default except the sampler seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }
}
