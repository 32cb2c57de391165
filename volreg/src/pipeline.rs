use crate::Registration;
use log::*;
use sift3d::matching::{match_coordinates, symmetric_matches};
use volreg_core::{common_dims, Affine, Image, PointMatch, Result};
use volreg_ransac::Ransac;

/// Register a source volume to a reference volume.
///
/// The pipeline zero-pads both inputs to a common shape, extracts keypoints
/// and descriptors from each, matches descriptors with the ratio test and a
/// forward/backward cross-check, and fits an affine transform with seeded
/// RANSAC. Returns the transform mapping source coordinates to reference
/// coordinates together with the inlier correspondences that support it.
///
/// Fails with [`volreg_core::Error::InsufficientInliers`] when the matches
/// cannot support a consensus of `min_inlier_ratio`.
pub fn register(
    config: &Registration,
    source: &Image,
    reference: &Image,
) -> Result<(Affine, Vec<PointMatch>)> {
    // A common padded shape keeps both feature sets in one coordinate frame.
    let (nx, ny, nz) = common_dims(source, reference);
    let source = source.padded_to(nx, ny, nz)?;
    let reference = reference.padded_to(nx, ny, nz)?;

    info!("Extracting source features.");
    let (_, desc_src) = config.sift.extract(&source)?;
    info!("Extracting reference features.");
    let (_, desc_ref) = config.sift.extract(&reference)?;

    let matches = symmetric_matches(&desc_src, &desc_ref, config.nn_thresh);
    let correspondences = match_coordinates(&desc_src, &desc_ref, &matches);
    info!(
        "Matched {} of {} source descriptors.",
        correspondences.len(),
        desc_src.len()
    );

    let mut consensus = Ransac::new(
        config.min_inlier_ratio,
        config.err_thresh,
        config.num_iter,
        config.seed,
    );
    let (tform, inliers) = consensus.model_inliers::<Affine>(&correspondences)?;
    info!(
        "Fit affine transform with {}/{} inliers.",
        inliers.len(),
        correspondences.len()
    );
    Ok((
        tform,
        inliers.into_iter().map(|i| correspondences[i]).collect(),
    ))
}
