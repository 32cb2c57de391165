//! Dominant-orientation assignment: a full 3D local frame from the
//! eigenvectors of a Gaussian-weighted gradient structure tensor.

use float_ord::FloatOrd;
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use volreg_core::Image;

/// Window radius and weight sigma as a multiple of the keypoint scale.
const ORIENTATION_RADIUS_FACTOR: f64 = 1.5;

/// Smallest eigenvalue and gradient-projection magnitudes treated as signal.
const FLAT_EPSILON: f64 = 1e-12;

/// Central-difference gradient at an interior voxel.
#[inline]
pub(crate) fn gradient(image: &Image, x: usize, y: usize, z: usize) -> Vector3<f64> {
    Vector3::new(
        0.5 * (image.at(x + 1, y, z) - image.at(x - 1, y, z)) as f64,
        0.5 * (image.at(x, y + 1, z) - image.at(x, y - 1, z)) as f64,
        0.5 * (image.at(x, y, z + 1) - image.at(x, y, z - 1)) as f64,
    )
}

/// Compute the dominant local frame at `center` (in the level's voxel
/// coordinates) from the structure tensor accumulated over a spherical
/// window of radius `1.5 * sigma` with Gaussian weights of the same sigma.
///
/// The columns of the returned rotation are the tensor's eigenvectors with
/// eigenvalues descending. The first two eigenvector signs are chosen to
/// point along the window's mean weighted gradient, which makes the frame
/// covariant with rotations of the data; the third column is their cross
/// product, so the frame is always right-handed. Returns `None` on flat or
/// degenerate neighborhoods; the caller drops the candidate.
pub(crate) fn dominant_frame(
    image: &Image,
    center: Point3<f64>,
    sigma: f64,
) -> Option<Rotation3<f64>> {
    let radius = ORIENTATION_RADIUS_FACTOR * sigma;
    let weight_sigma = ORIENTATION_RADIUS_FACTOR * sigma;
    let radius_sq = radius * radius;

    let mut tensor = Matrix3::<f64>::zeros();
    let mut mean_gradient = Vector3::<f64>::zeros();
    let lo = |c: f64| ((c - radius).ceil() as isize).max(1);
    let hi = |c: f64, n: usize| ((c + radius).floor() as isize).min(n as isize - 2);
    for z in lo(center.z)..=hi(center.z, image.nz()) {
        for y in lo(center.y)..=hi(center.y, image.ny()) {
            for x in lo(center.x)..=hi(center.x, image.nx()) {
                let offset = Vector3::new(
                    x as f64 - center.x,
                    y as f64 - center.y,
                    z as f64 - center.z,
                );
                let distance_sq = offset.norm_squared();
                if distance_sq > radius_sq {
                    continue;
                }
                let weight = (-distance_sq / (2.0 * weight_sigma * weight_sigma)).exp();
                let g = gradient(image, x as usize, y as usize, z as usize);
                tensor += weight * g * g.transpose();
                mean_gradient += weight * g;
            }
        }
    }

    let eigen = tensor.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by_key(|&i| std::cmp::Reverse(FloatOrd(eigen.eigenvalues[i])));
    if eigen.eigenvalues[order[0]] <= FLAT_EPSILON {
        return None;
    }

    let oriented = |index: usize| {
        let v: Vector3<f64> = eigen.eigenvectors.column(index).into_owned();
        if v.dot(&mean_gradient) < 0.0 {
            -v
        } else {
            v
        }
    };
    let e1 = oriented(order[0]);
    let e2 = oriented(order[1]);
    let e3 = e1.cross(&e2);
    if e3.norm_squared() <= FLAT_EPSILON {
        return None;
    }
    Some(Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[
        e1, e2, e3,
    ])))
}
