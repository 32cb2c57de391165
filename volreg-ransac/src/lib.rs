//! # `volreg-ransac`
//!
//! A seeded RANSAC engine over the [`TransformModel`] capability trait.
//!
//! Each iteration samples `MIN_SAMPLES` correspondences uniformly without
//! replacement, fits a candidate by least squares, and counts inliers under
//! a Euclidean error threshold. The best candidate (ties broken by lower
//! mean inlier residual) is refit on its complete inlier set. The random
//! stream comes from a caller-seeded PCG, so identical seed and input
//! produce bit-identical output under any build.

use log::*;
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use volreg_core::{Error, PointMatch, Result, TransformModel};

/// The RANSAC consensus engine.
///
/// `min_inlier_ratio` is the fraction of correspondences that must agree
/// with the winning model; `err_thresh` is the inlier distance threshold in
/// the reference frame's units; `num_iter` bounds the runtime exactly.
#[derive(Debug, Clone)]
pub struct Ransac {
    pub min_inlier_ratio: f64,
    pub err_thresh: f64,
    pub num_iter: usize,
    rng: Pcg64,
}

impl Ransac {
    pub fn new(min_inlier_ratio: f64, err_thresh: f64, num_iter: usize, seed: u64) -> Self {
        Self {
            min_inlier_ratio,
            err_thresh,
            num_iter,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Find the transform with the largest consensus among the
    /// correspondences, returning it together with the indices of its
    /// inliers. Fails with [`Error::InsufficientInliers`] when no candidate
    /// reaches `ceil(min_inlier_ratio * N)` inliers (and never with fewer
    /// than the model's minimal sample).
    pub fn model_inliers<M: TransformModel>(
        &mut self,
        matches: &[PointMatch],
    ) -> Result<(M, Vec<usize>)> {
        let n = matches.len();
        let needed = ((self.min_inlier_ratio * n as f64).ceil() as usize).max(M::MIN_SAMPLES);
        if n < M::MIN_SAMPLES {
            return Err(Error::InsufficientInliers { found: 0, needed });
        }

        let mut best: Option<(usize, f64, M)> = None;
        for _ in 0..self.num_iter {
            let indices = sample(&mut self.rng, n, M::MIN_SAMPLES);
            let src: Vec<_> = indices.iter().map(|i| matches[i].0).collect();
            let dst: Vec<_> = indices.iter().map(|i| matches[i].1).collect();
            let Ok(candidate) = M::fit_from_points(&src, &dst) else {
                continue;
            };

            let mut count = 0usize;
            let mut residual_sum = 0f64;
            for correspondence in matches {
                let residual = candidate.residual(correspondence);
                if residual < self.err_thresh {
                    count += 1;
                    residual_sum += residual;
                }
            }
            if count == 0 {
                continue;
            }
            let mean_residual = residual_sum / count as f64;
            let better = match &best {
                None => true,
                Some((best_count, best_mean, _)) => {
                    count > *best_count || (count == *best_count && mean_residual < *best_mean)
                }
            };
            if better {
                best = Some((count, mean_residual, candidate));
            }
        }

        let Some((count, _, candidate)) = best else {
            return Err(Error::InsufficientInliers { found: 0, needed });
        };
        if count < needed {
            return Err(Error::InsufficientInliers {
                found: count,
                needed,
            });
        }

        let inliers: Vec<usize> = matches
            .iter()
            .enumerate()
            .filter(|(_, correspondence)| candidate.residual(correspondence) < self.err_thresh)
            .map(|(index, _)| index)
            .collect();
        debug!(
            "Consensus of {}/{} correspondences after {} iterations.",
            inliers.len(),
            n,
            self.num_iter
        );

        // Refit on the complete inlier set.
        let src: Vec<_> = inliers.iter().map(|&i| matches[i].0).collect();
        let dst: Vec<_> = inliers.iter().map(|&i| matches[i].1).collect();
        let refit = M::fit_from_points(&src, &dst)?;
        Ok((refit, inliers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Point3, Vector3};
    use rand::Rng;
    use volreg_core::Affine;

    fn example_transform() -> Affine {
        Affine::from_parts(
            Matrix3::new(0.95, -0.2, 0.0, 0.2, 0.95, 0.1, 0.0, -0.1, 1.05),
            Vector3::new(4.0, -1.5, 2.0),
        )
    }

    fn random_point(rng: &mut Pcg64) -> Point3<f64> {
        Point3::new(
            rng.gen::<f64>() * 100.0,
            rng.gen::<f64>() * 100.0,
            rng.gen::<f64>() * 100.0,
        )
    }

    /// Thirty exact correspondences polluted with ten gross outliers.
    fn contaminated_matches(seed: u64) -> Vec<PointMatch> {
        let tform = example_transform();
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut matches: Vec<PointMatch> = (0..30)
            .map(|_| {
                let p = random_point(&mut rng);
                PointMatch(p, tform.apply(p))
            })
            .collect();
        matches.extend((0..10).map(|_| PointMatch(random_point(&mut rng), random_point(&mut rng))));
        matches
    }

    #[test]
    fn recovers_the_transform_through_outliers() {
        let matches = contaminated_matches(13);
        let mut ransac = Ransac::new(0.5, 1.0, 200, 42);
        let (model, inliers) = ransac.model_inliers::<Affine>(&matches).unwrap();
        assert_eq!(inliers.len(), 30);
        assert!(inliers.iter().all(|&i| i < 30));
        assert!((model.matrix() - example_transform().matrix()).norm() < 1e-9);
    }

    #[test]
    fn identical_seed_gives_bit_identical_output() {
        let matches = contaminated_matches(5);
        let run = |seed| {
            Ransac::new(0.5, 1.0, 100, seed)
                .model_inliers::<Affine>(&matches)
                .unwrap()
        };
        let (model_a, inliers_a) = run(7);
        let (model_b, inliers_b) = run(7);
        assert_eq!(model_a.params(), model_b.params());
        assert_eq!(inliers_a, inliers_b);
    }

    #[test]
    fn all_noise_fails_with_insufficient_inliers() {
        let mut rng = Pcg64::seed_from_u64(3);
        let matches: Vec<PointMatch> = (0..40)
            .map(|_| PointMatch(random_point(&mut rng), random_point(&mut rng)))
            .collect();
        let mut ransac = Ransac::new(0.5, 5.0, 100, 11);
        assert!(matches!(
            ransac.model_inliers::<Affine>(&matches),
            Err(Error::InsufficientInliers { needed: 20, .. })
        ));
    }

    #[test]
    fn too_few_correspondences_fail_immediately() {
        let matches = vec![PointMatch(Point3::origin(), Point3::origin()); 3];
        let mut ransac = Ransac::new(0.001, 5.0, 10, 0);
        assert!(matches!(
            ransac.model_inliers::<Affine>(&matches),
            Err(Error::InsufficientInliers { .. })
        ));
    }
}
