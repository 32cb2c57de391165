//! Ratio-test nearest-neighbor matching of descriptor stores, with an
//! optional forward/backward cross-check.

use crate::descriptor::DescriptorStore;
use log::*;
use volreg_core::PointMatch;

/// The two nearest reference descriptors of one query, by squared Euclidean
/// distance.
fn two_nearest(query: &[f32], store: &DescriptorStore) -> Option<(usize, f32, f32)> {
    let mut best = (usize::MAX, f32::INFINITY);
    let mut second = f32::INFINITY;
    for (index, descriptor) in store.iter().enumerate() {
        let distance_sq: f32 = query
            .iter()
            .zip(&descriptor.histogram)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if distance_sq < best.1 {
            second = best.1;
            best = (index, distance_sq);
        } else if distance_sq < second {
            second = distance_sq;
        }
    }
    (best.0 != usize::MAX && second.is_finite()).then_some((best.0, best.1, second))
}

/// One-directional matching: for each source descriptor, the index of its
/// nearest reference descriptor if it passes the ratio test
/// `d1 < nn_thresh * d2` (evaluated on squared distances), else `None`.
/// Fewer than two reference descriptors means nothing can pass the test.
pub fn match_descriptors(
    source: &DescriptorStore,
    reference: &DescriptorStore,
    nn_thresh: f32,
) -> Vec<Option<usize>> {
    let threshold_sq = nn_thresh * nn_thresh;
    source
        .iter()
        .map(|descriptor| {
            two_nearest(&descriptor.histogram, reference).and_then(|(index, d1_sq, d2_sq)| {
                (d1_sq < threshold_sq * d2_sq).then_some(index)
            })
        })
        .collect()
}

/// Symmetric matching: a pair survives only when each side is the other's
/// ratio-test nearest neighbor. The output is indexed by source descriptor.
pub fn symmetric_matches(
    source: &DescriptorStore,
    reference: &DescriptorStore,
    nn_thresh: f32,
) -> Vec<Option<usize>> {
    let forward = match_descriptors(source, reference, nn_thresh);
    let backward = match_descriptors(reference, source, nn_thresh);
    let matches: Vec<Option<usize>> = forward
        .into_iter()
        .enumerate()
        .map(|(source_index, reference_index)| {
            reference_index.filter(|&ri| backward[ri] == Some(source_index))
        })
        .collect();
    debug!(
        "{} symmetric matches from {} source and {} reference descriptors.",
        matches.iter().flatten().count(),
        source.len(),
        reference.len()
    );
    matches
}

/// Convert a match vector into the matched coordinate pairs consumed by the
/// transform fitter.
pub fn match_coordinates(
    source: &DescriptorStore,
    reference: &DescriptorStore,
    matches: &[Option<usize>],
) -> Vec<PointMatch> {
    matches
        .iter()
        .enumerate()
        .filter_map(|(source_index, &reference_index)| {
            reference_index
                .map(|ri| PointMatch(source[source_index].point, reference[ri].point))
        })
        .collect()
}
