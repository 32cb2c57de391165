//! DoG extremum detection: scanning, contrast and edge pruning, sub-voxel
//! refinement, and orientation assignment.

use crate::orientation::dominant_frame;
use crate::pyramid::{Level, Pyramid};
use crate::Sift3d;
use log::*;
use nalgebra::{Matrix3, Matrix4, Point3, Vector4};
use volreg_core::{Image, Keypoint, KeypointStore};

/// Maximum re-centering iterations of the quadratic refinement.
const MAX_REFINEMENT_STEPS: usize = 5;

/// The edge ratio test is calibrated for 8-bit dynamic range, and the
/// trace/determinant ratio of a 3x3 Hessian is not scale-invariant, so
/// unit-range data is rescaled before the test (the contrast threshold is
/// already quoted for unit range).
const EDGE_TEST_DYNAMIC_RANGE: f64 = 255.0;

/// A voxel is an extremum iff it is strictly above (or strictly below) all
/// 26 neighbors in its own level and the full 3x3x3 neighborhoods of the
/// levels directly below and above.
fn is_extremum(below: &Image, level: &Image, above: &Image, x: usize, y: usize, z: usize) -> bool {
    let value = level.at(x, y, z);
    let mut is_max = true;
    let mut is_min = true;
    for dz in -1i64..=1 {
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let (nx, ny, nz) = (
                    (x as i64 + dx) as usize,
                    (y as i64 + dy) as usize,
                    (z as i64 + dz) as usize,
                );
                if dx != 0 || dy != 0 || dz != 0 {
                    let neighbor = level.at(nx, ny, nz);
                    is_max &= value > neighbor;
                    is_min &= value < neighbor;
                }
                let lower = below.at(nx, ny, nz);
                let upper = above.at(nx, ny, nz);
                is_max &= value > lower && value > upper;
                is_min &= value < lower && value < upper;
                if !is_max && !is_min {
                    return false;
                }
            }
        }
    }
    is_max || is_min
}

/// The 3x3 spatial Hessian of a DoG level by central differences.
fn spatial_hessian(image: &Image, x: usize, y: usize, z: usize) -> Matrix3<f64> {
    let v = image.at(x, y, z) as f64;
    let f = |dx: i64, dy: i64, dz: i64| {
        image.at(
            (x as i64 + dx) as usize,
            (y as i64 + dy) as usize,
            (z as i64 + dz) as usize,
        ) as f64
    };
    let dxx = f(1, 0, 0) + f(-1, 0, 0) - 2.0 * v;
    let dyy = f(0, 1, 0) + f(0, -1, 0) - 2.0 * v;
    let dzz = f(0, 0, 1) + f(0, 0, -1) - 2.0 * v;
    let dxy = 0.25 * (f(1, 1, 0) + f(-1, -1, 0) - f(1, -1, 0) - f(-1, 1, 0));
    let dxz = 0.25 * (f(1, 0, 1) + f(-1, 0, -1) - f(1, 0, -1) - f(-1, 0, 1));
    let dyz = 0.25 * (f(0, 1, 1) + f(0, -1, -1) - f(0, 1, -1) - f(0, -1, 1));
    Matrix3::new(dxx, dxy, dxz, dxy, dyy, dyz, dxz, dyz, dzz)
}

/// Edge responses have a large trace-to-determinant ratio. Rejects when
/// `tr(H)^2 / det(H) >= (r + 1)^2 / r` or when the determinant is
/// non-positive.
fn passes_edge_test(image: &Image, x: usize, y: usize, z: usize, edge_thresh: f64) -> bool {
    let hessian = spatial_hessian(image, x, y, z) * EDGE_TEST_DYNAMIC_RANGE;
    let det = hessian.determinant();
    if det <= 0.0 {
        return false;
    }
    let trace = hessian.trace();
    trace * trace / det < (edge_thresh + 1.0).powi(2) / edge_thresh
}

/// Gradient and Hessian of the DoG over `(x, y, z, s)` by finite
/// differences across three adjacent levels.
fn scale_space_derivatives(
    below: &Image,
    level: &Image,
    above: &Image,
    x: usize,
    y: usize,
    z: usize,
) -> (Vector4<f64>, Matrix4<f64>) {
    let f = |image: &Image, dx: i64, dy: i64, dz: i64| {
        image.at(
            (x as i64 + dx) as usize,
            (y as i64 + dy) as usize,
            (z as i64 + dz) as usize,
        ) as f64
    };
    let v = f(level, 0, 0, 0);

    let gradient = Vector4::new(
        0.5 * (f(level, 1, 0, 0) - f(level, -1, 0, 0)),
        0.5 * (f(level, 0, 1, 0) - f(level, 0, -1, 0)),
        0.5 * (f(level, 0, 0, 1) - f(level, 0, 0, -1)),
        0.5 * (f(above, 0, 0, 0) - f(below, 0, 0, 0)),
    );

    let dxx = f(level, 1, 0, 0) + f(level, -1, 0, 0) - 2.0 * v;
    let dyy = f(level, 0, 1, 0) + f(level, 0, -1, 0) - 2.0 * v;
    let dzz = f(level, 0, 0, 1) + f(level, 0, 0, -1) - 2.0 * v;
    let dss = f(above, 0, 0, 0) + f(below, 0, 0, 0) - 2.0 * v;
    let dxy = 0.25 * (f(level, 1, 1, 0) + f(level, -1, -1, 0) - f(level, 1, -1, 0) - f(level, -1, 1, 0));
    let dxz = 0.25 * (f(level, 1, 0, 1) + f(level, -1, 0, -1) - f(level, 1, 0, -1) - f(level, -1, 0, 1));
    let dyz = 0.25 * (f(level, 0, 1, 1) + f(level, 0, -1, -1) - f(level, 0, 1, -1) - f(level, 0, -1, 1));
    let dxs = 0.25 * (f(above, 1, 0, 0) - f(above, -1, 0, 0) - f(below, 1, 0, 0) + f(below, -1, 0, 0));
    let dys = 0.25 * (f(above, 0, 1, 0) - f(above, 0, -1, 0) - f(below, 0, 1, 0) + f(below, 0, -1, 0));
    let dzs = 0.25 * (f(above, 0, 0, 1) - f(above, 0, 0, -1) - f(below, 0, 0, 1) + f(below, 0, 0, -1));

    let hessian = Matrix4::new(
        dxx, dxy, dxz, dxs, //
        dxy, dyy, dyz, dys, //
        dxz, dyz, dzz, dzs, //
        dxs, dys, dzs, dss,
    );
    (gradient, hessian)
}

/// Fit a quadratic around the integer extremum and solve for the sub-voxel
/// offset, re-centering up to [`MAX_REFINEMENT_STEPS`] times when any offset
/// component exceeds half a voxel. Returns the refined `(x, y, z, sublevel)`
/// or `None` when the candidate drifts out of bounds, the system is
/// singular, or the iteration does not converge.
fn refine_extremum(
    levels: &[Level],
    num_intervals: usize,
    mut l: usize,
    mut x: usize,
    mut y: usize,
    mut z: usize,
) -> Option<(f64, f64, f64, f64)> {
    let (nx, ny, nz) = levels[0].image.dims();
    for _ in 0..MAX_REFINEMENT_STEPS {
        let (gradient, hessian) = scale_space_derivatives(
            &levels[l - 1].image,
            &levels[l].image,
            &levels[l + 1].image,
            x,
            y,
            z,
        );
        let offset = hessian.lu().solve(&-gradient)?;
        if offset.iter().all(|component| component.abs() <= 0.5) {
            return Some((
                x as f64 + offset.x,
                y as f64 + offset.y,
                z as f64 + offset.z,
                l as f64 + offset.w,
            ));
        }
        // Shift one step along each axis whose offset exceeds half a voxel
        // and try again from the new center.
        let step = |coordinate: usize, component: f64, limit: usize| -> Option<usize> {
            let next = if component > 0.5 {
                coordinate as i64 + 1
            } else if component < -0.5 {
                coordinate as i64 - 1
            } else {
                coordinate as i64
            };
            (next >= 1 && next < limit as i64 - 1).then_some(next as usize)
        };
        x = step(x, offset.x, nx)?;
        y = step(y, offset.y, ny)?;
        z = step(z, offset.z, nz)?;
        let next_l = if offset.w > 0.5 {
            l as i64 + 1
        } else if offset.w < -0.5 {
            l as i64 - 1
        } else {
            l as i64
        };
        if next_l < 1 || next_l > num_intervals as i64 {
            return None;
        }
        l = next_l as usize;
    }
    None
}

impl Sift3d {
    /// Detect keypoints from the DoG pyramid, assigning orientations from
    /// the Gaussian pyramid. Keypoints come out in deterministic scan order
    /// (octave, level, then z/y/x), with positions and scales in the base
    /// frame. Candidates failing any test vanish silently.
    pub fn detect_keypoints(&self, gss: &Pyramid, dog: &Pyramid) -> KeypointStore {
        // Octave 0 is the 2x-upsampled input, so the base frame is octave 0
        // scaled down by 2.
        let (up_nx, up_ny, up_nz) = gss.level(0, 0).image.dims();
        let base_dims = (
            (up_nx / 2) as f64,
            (up_ny / 2) as f64,
            (up_nz / 2) as f64,
        );

        let mut keypoints = KeypointStore::new();
        let mut num_extrema = 0usize;
        let mut num_pruned = 0usize;
        let mut num_refined = 0usize;
        for (o, levels) in dog.octaves.iter().enumerate() {
            let scale_to_base = 2f64.powi(o as i32 - 1);
            for l in 1..=self.num_intervals {
                let (below, level, above) =
                    (&levels[l - 1].image, &levels[l].image, &levels[l + 1].image);
                let (nx, ny, nz) = level.dims();
                if nx < 3 || ny < 3 || nz < 3 {
                    continue;
                }
                for z in 1..nz - 1 {
                    for y in 1..ny - 1 {
                        for x in 1..nx - 1 {
                            if !is_extremum(below, level, above, x, y, z) {
                                continue;
                            }
                            num_extrema += 1;
                            if (level.at(x, y, z) as f64).abs() < self.peak_thresh {
                                continue;
                            }
                            if !passes_edge_test(level, x, y, z, self.edge_thresh) {
                                continue;
                            }
                            num_pruned += 1;
                            let Some((px, py, pz, sublevel)) =
                                refine_extremum(levels, self.num_intervals, l, x, y, z)
                            else {
                                continue;
                            };
                            num_refined += 1;
                            if let Some(keypoint) = self.assemble_keypoint(
                                gss,
                                o,
                                sublevel,
                                Point3::new(px, py, pz),
                                scale_to_base,
                                base_dims,
                            ) {
                                keypoints.push(keypoint);
                            }
                        }
                    }
                }
            }
        }
        debug!(
            "{} extrema, {} after pruning, {} refined, {} oriented.",
            num_extrema,
            num_pruned,
            num_refined,
            keypoints.len()
        );
        keypoints
    }

    /// Assign the orientation frame and express the candidate in the base
    /// frame. Returns `None` when the position leaves the volume or no
    /// stable frame exists.
    fn assemble_keypoint(
        &self,
        gss: &Pyramid,
        octave: usize,
        sublevel: f64,
        position: Point3<f64>,
        scale_to_base: f64,
        base_dims: (f64, f64, f64),
    ) -> Option<Keypoint> {
        let point = position * scale_to_base;
        if point.x < 0.0
            || point.y < 0.0
            || point.z < 0.0
            || point.x >= base_dims.0
            || point.y >= base_dims.1
            || point.z >= base_dims.2
        {
            return None;
        }

        // Blur of the refined sub-level in this octave's own voxel grid.
        let relative_sigma =
            self.sigma0 * 2f64.powf(sublevel / self.num_intervals as f64);
        let gaussian_level = (sublevel.round().max(0.0) as usize).min(self.num_intervals + 2);
        let frame = dominant_frame(
            &gss.level(octave, gaussian_level).image,
            position,
            relative_sigma,
        )?;

        Some(Keypoint {
            point,
            octave,
            sublevel,
            sigma: self.sigma0
                * 2f64.powf(octave as f64 + sublevel / self.num_intervals as f64),
            frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volreg_core::Image;

    /// A bright Gaussian blob centered in an otherwise dark volume.
    fn blob_volume(n: usize, center: (f64, f64, f64), width: f64) -> Image {
        let mut image = Image::new_scalar(n, n, n).unwrap();
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let d2 = (x as f64 - center.0).powi(2)
                        + (y as f64 - center.1).powi(2)
                        + (z as f64 - center.2).powi(2);
                    image.set(x, y, z, (-d2 / (2.0 * width * width)).exp() as f32);
                }
            }
        }
        image
    }

    #[test]
    fn blob_center_is_detected_near_its_true_position() {
        let center = (15.5, 16.0, 16.5);
        let image = blob_volume(32, center, 2.0);
        let config = Sift3d::default();
        let gss = config.build_gaussian_pyramid(&image).unwrap();
        let dog = config.build_dog_pyramid(&gss);
        let keypoints = config.detect_keypoints(&gss, &dog);
        assert!(!keypoints.is_empty());
        let closest = keypoints
            .iter()
            .map(|kp| {
                ((kp.point.x - center.0).powi(2)
                    + (kp.point.y - center.1).powi(2)
                    + (kp.point.z - center.2).powi(2))
                .sqrt()
            })
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 1.0, "closest detection was {closest} voxels away");
    }

    #[test]
    fn keypoints_stay_inside_the_base_frame() {
        let image = blob_volume(32, (10.0, 20.0, 16.0), 3.0);
        let config = Sift3d::default();
        let gss = config.build_gaussian_pyramid(&image).unwrap();
        let dog = config.build_dog_pyramid(&gss);
        for kp in config.detect_keypoints(&gss, &dog).iter() {
            assert!(kp.point.x >= 0.0 && kp.point.x < 32.0);
            assert!(kp.point.y >= 0.0 && kp.point.y < 32.0);
            assert!(kp.point.z >= 0.0 && kp.point.z < 32.0);
            assert!((kp.sigma
                - config.sigma0
                    * 2f64.powf(kp.octave as f64 + kp.sublevel / config.num_intervals as f64))
            .abs()
                < 1e-12);
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let image = blob_volume(24, (12.0, 11.0, 13.0), 2.5);
        let config = Sift3d::default();
        let gss = config.build_gaussian_pyramid(&image).unwrap();
        let dog = config.build_dog_pyramid(&gss);
        let first = config.detect_keypoints(&gss, &dog);
        let second = config.detect_keypoints(&gss, &dog);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.point, b.point);
            assert_eq!(a.frame, b.frame);
        }
    }
}
