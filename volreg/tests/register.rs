//! End-to-end registration scenarios on synthetic blob volumes.

use nalgebra::{Matrix3, Point3, Vector3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use volreg::{register, transform_volume, Affine, Image, Registration, TransformModel};

/// A volume of randomly placed Gaussian blobs, clamped to unit range.
fn blob_volume(n: usize, num_blobs: usize, seed: u64) -> Image {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut image = Image::new_scalar(n, n, n).unwrap();
    let blobs: Vec<(f64, f64, f64, f64, f32)> = (0..num_blobs)
        .map(|_| {
            let margin = 6.0;
            let span = n as f64 - 2.0 * margin;
            (
                margin + rng.gen::<f64>() * span,
                margin + rng.gen::<f64>() * span,
                margin + rng.gen::<f64>() * span,
                1.5 + rng.gen::<f64>() * 1.5,
                0.5 + rng.gen::<f32>() * 0.5,
            )
        })
        .collect();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let mut value = 0f32;
                for &(cx, cy, cz, width, amplitude) in &blobs {
                    let d2 = (x as f64 - cx).powi(2)
                        + (y as f64 - cy).powi(2)
                        + (z as f64 - cz).powi(2);
                    value += amplitude * (-d2 / (2.0 * width * width)).exp() as f32;
                }
                image.set(x, y, z, value.min(1.0));
            }
        }
    }
    image
}

/// A rotation by `degrees` about the z axis through the volume center.
fn rotation_about_center(degrees: f64, n: usize) -> Affine {
    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();
    let linear = Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0);
    let center = Vector3::repeat((n - 1) as f64 / 2.0);
    Affine::from_parts(linear, center - linear * center)
}

/// Registering a volume against itself recovers the identity transform.
#[test]
fn identity_registration() {
    let _ = env_logger::builder().is_test(true).try_init();
    let volume = blob_volume(32, 20, 17);
    let (tform, inliers) = register(&Registration::default(), &volume, &volume).unwrap();
    assert!(!inliers.is_empty());
    let deviation = (tform.linear() - Matrix3::identity()).norm() + tform.translation().norm();
    assert!(deviation < 1e-3, "deviation from identity was {deviation}");
}

/// A small known rotation applied to the reference produces a source whose
/// registration recovers the inverse rotation to sub-voxel accuracy.
#[test]
fn synthetic_rotation_is_recovered() {
    let _ = env_logger::builder().is_test(true).try_init();
    let n = 48;
    let reference = blob_volume(n, 30, 23);
    let synthetic = rotation_about_center(5.0, n);
    let source =
        transform_volume(&reference, &synthetic, reference.dims(), reference.spacing()).unwrap();

    let (tform, inliers) = register(&Registration::default(), &source, &reference).unwrap();
    assert!(inliers.len() >= 4);

    // A feature at p in the reference lands at T(p) in the source, so the
    // fitted source-to-reference map should approximate T^-1.
    let expected = synthetic.inverse().unwrap();
    let angle = tform.linear()[(1, 0)]
        .atan2(tform.linear()[(0, 0)])
        .to_degrees();
    assert!(
        (angle + 5.0).abs() < 0.2,
        "recovered rotation angle was {angle} degrees"
    );
    let center = Point3::new(
        (n - 1) as f64 / 2.0,
        (n - 1) as f64 / 2.0,
        (n - 1) as f64 / 2.0,
    );
    let drift = (tform.apply(center) - expected.apply(center)).norm();
    assert!(drift < 0.5, "translation drift at center was {drift} voxels");
}

/// Identical seed and inputs give a bit-identical transform.
#[test]
fn registration_is_deterministic() {
    let volume = blob_volume(24, 12, 31);
    let run = || {
        let (tform, _) = register(&Registration::with_seed(99), &volume, &volume).unwrap();
        tform.params()
    };
    assert_eq!(run(), run());
}

/// Differently sized inputs are zero-padded to a common shape instead of
/// being rejected; padding a volume does not move its features.
#[test]
fn mismatched_shapes_are_padded() {
    let a = blob_volume(28, 10, 41);
    let b = a.padded_to(32, 30, 34).unwrap();
    let (tform, inliers) = register(&Registration::default(), &a, &b).unwrap();
    assert!(!inliers.is_empty());
    let deviation = (tform.linear() - Matrix3::identity()).norm() + tform.translation().norm();
    assert!(deviation < 1e-3, "deviation from identity was {deviation}");
}
