//! Separable convolution and resampling primitives for scale-space
//! construction. All functions operate on single-channel volumes.

use volreg_core::Image;

/// The Gaussian function.
fn gaussian(x: f64, sigma: f64) -> f64 {
    ((2.0 * std::f64::consts::PI).sqrt() * sigma).recip()
        * (-x.powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Generate a truncated, sum-normalized Gaussian kernel of radius
/// `ceil(3 * sigma)`. A non-positive sigma yields the identity kernel.
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (3.0 * sigma).ceil() as i64;
    let mut kernel = Vec::with_capacity(2 * radius as usize + 1);
    let mut sum = 0.0;
    for i in -radius..=radius {
        let value = gaussian(i as f64, sigma);
        kernel.push(value);
        sum += value;
    }
    kernel.iter().map(|v| (v / sum) as f32).collect()
}

/// Mirror an out-of-range index back into `[0, n)`.
#[inline(always)]
fn reflect(index: i64, n: i64) -> usize {
    let r = if index < 0 {
        -index - 1
    } else if index >= n {
        2 * n - index - 1
    } else {
        index
    };
    // A single fold suffices unless the kernel is wider than the volume.
    r.clamp(0, n - 1) as usize
}

/// Convolve along the x axis with reflected boundaries.
pub fn filter_x(image: &Image, kernel: &[f32]) -> Image {
    debug_assert!(kernel.len() % 2 == 1);
    let (nx, ny, nz) = image.dims();
    let (ux, uy, uz) = image.spacing();
    let half = (kernel.len() / 2) as i64;
    let mut output = Image::new_scalar(nx, ny, nz)
        .expect("filter input has nonzero dimensions")
        .with_spacing(ux, uy, uz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let mut accumulator = 0f32;
                for (k, &weight) in kernel.iter().enumerate() {
                    let sx = reflect(x as i64 + k as i64 - half, nx as i64);
                    accumulator += weight * image.at(sx, y, z);
                }
                output.set(x, y, z, accumulator);
            }
        }
    }
    output
}

/// Convolve along the y axis with reflected boundaries.
pub fn filter_y(image: &Image, kernel: &[f32]) -> Image {
    debug_assert!(kernel.len() % 2 == 1);
    let (nx, ny, nz) = image.dims();
    let (ux, uy, uz) = image.spacing();
    let half = (kernel.len() / 2) as i64;
    let mut output = Image::new_scalar(nx, ny, nz)
        .expect("filter input has nonzero dimensions")
        .with_spacing(ux, uy, uz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let mut accumulator = 0f32;
                for (k, &weight) in kernel.iter().enumerate() {
                    let sy = reflect(y as i64 + k as i64 - half, ny as i64);
                    accumulator += weight * image.at(x, sy, z);
                }
                output.set(x, y, z, accumulator);
            }
        }
    }
    output
}

/// Convolve along the z axis with reflected boundaries.
pub fn filter_z(image: &Image, kernel: &[f32]) -> Image {
    debug_assert!(kernel.len() % 2 == 1);
    let (nx, ny, nz) = image.dims();
    let (ux, uy, uz) = image.spacing();
    let half = (kernel.len() / 2) as i64;
    let mut output = Image::new_scalar(nx, ny, nz)
        .expect("filter input has nonzero dimensions")
        .with_spacing(ux, uy, uz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let mut accumulator = 0f32;
                for (k, &weight) in kernel.iter().enumerate() {
                    let sz = reflect(z as i64 + k as i64 - half, nz as i64);
                    accumulator += weight * image.at(x, y, sz);
                }
                output.set(x, y, z, accumulator);
            }
        }
    }
    output
}

/// Separable Gaussian blur with reflected boundaries.
pub fn gaussian_blur(image: &Image, sigma: f64) -> Image {
    let kernel = gaussian_kernel(sigma);
    if kernel.len() == 1 {
        return image.clone();
    }
    let pass_x = filter_x(image, &kernel);
    let pass_xy = filter_y(&pass_x, &kernel);
    filter_z(&pass_xy, &kernel)
}

/// Double every spatial dimension with trilinear interpolation. Output voxel
/// `i` samples input coordinate `i / 2`.
pub fn upsample_double(image: &Image) -> Image {
    let (nx, ny, nz) = image.dims();
    let (ux, uy, uz) = image.spacing();
    let mut output = Image::new_scalar(2 * nx, 2 * ny, 2 * nz)
        .expect("upsample input has nonzero dimensions")
        .with_spacing(ux / 2.0, uy / 2.0, uz / 2.0);
    let upper = |i: usize, n: usize| (i + 1).min(n - 1);
    for z in 0..2 * nz {
        let z0 = z / 2;
        let z1 = upper(z0, nz);
        let fz = if z % 2 == 0 { 0.0f32 } else { 0.5 };
        for y in 0..2 * ny {
            let y0 = y / 2;
            let y1 = upper(y0, ny);
            let fy = if y % 2 == 0 { 0.0f32 } else { 0.5 };
            for x in 0..2 * nx {
                let x0 = x / 2;
                let x1 = upper(x0, nx);
                let fx = if x % 2 == 0 { 0.0f32 } else { 0.5 };
                let c00 = image.at(x0, y0, z0) * (1.0 - fx) + image.at(x1, y0, z0) * fx;
                let c10 = image.at(x0, y1, z0) * (1.0 - fx) + image.at(x1, y1, z0) * fx;
                let c01 = image.at(x0, y0, z1) * (1.0 - fx) + image.at(x1, y0, z1) * fx;
                let c11 = image.at(x0, y1, z1) * (1.0 - fx) + image.at(x1, y1, z1) * fx;
                let c0 = c00 * (1.0 - fy) + c10 * fy;
                let c1 = c01 * (1.0 - fy) + c11 * fy;
                output.set(x, y, z, c0 * (1.0 - fz) + c1 * fz);
            }
        }
    }
    output
}

/// Halve every spatial dimension by stride-2 decimation, keeping voxel 0.
pub fn decimate_half(image: &Image) -> Image {
    let (nx, ny, nz) = image.dims();
    let (ux, uy, uz) = image.spacing();
    let (mx, my, mz) = ((nx + 1) / 2, (ny + 1) / 2, (nz + 1) / 2);
    let mut output = Image::new_scalar(mx, my, mz)
        .expect("decimation input has nonzero dimensions")
        .with_spacing(ux * 2.0, uy * 2.0, uz * 2.0);
    for z in 0..mz {
        for y in 0..my {
            for x in 0..mx {
                output.set(x, y, z, image.at(2 * x, 2 * y, 2 * z));
            }
        }
    }
    output
}

/// Extract channel 0 of a multi-channel volume as a scalar volume. The
/// feature pipeline operates on channel 0 only.
pub fn scalar_channel(image: &Image) -> Image {
    if image.nc() == 1 {
        return image.clone();
    }
    let (nx, ny, nz) = image.dims();
    let (ux, uy, uz) = image.spacing();
    let mut output = Image::new_scalar(nx, ny, nz)
        .expect("channel extraction input has nonzero dimensions")
        .with_spacing(ux, uy, uz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                output.set(x, y, z, image.get(x, y, z, 0));
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_kernel_correct() {
        // Test against known correct values for sigma = 1.0, radius 3.
        let kernel = gaussian_kernel(1.0);
        let known_correct_kernel = [
            0.0044_3185,
            0.0539_9097,
            0.2419_7072,
            0.3989_4228,
            0.2419_7072,
            0.0539_9097,
            0.0044_3185,
        ];
        assert_eq!(kernel.len(), 7);
        let sum: f32 = known_correct_kernel.iter().sum();
        for (value, expected) in kernel.iter().zip(known_correct_kernel.iter()) {
            assert!((value - expected / sum).abs() < 1e-4);
        }
    }

    #[test]
    fn kernel_radius_is_three_sigma() {
        assert_eq!(gaussian_kernel(1.6).len(), 2 * 5 + 1);
        assert_eq!(gaussian_kernel(0.4).len(), 2 * 2 + 1);
    }

    #[test]
    fn blur_preserves_constant_volumes() {
        let mut image = Image::new_scalar(9, 9, 9).unwrap();
        image.data_mut().fill(0.75);
        let blurred = gaussian_blur(&image, 1.6);
        for &value in blurred.data() {
            assert!((value - 0.75).abs() < 1e-5);
        }
    }

    #[test]
    fn upsample_doubles_dimensions_and_interpolates() {
        let mut image = Image::new_scalar(2, 2, 2).unwrap();
        image.set(1, 0, 0, 1.0);
        let up = upsample_double(&image);
        assert_eq!(up.dims(), (4, 4, 4));
        assert_eq!(up.at(2, 0, 0), 1.0);
        // Midpoint between voxels 0 and 1 on the x axis.
        assert!((up.at(1, 0, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn decimate_keeps_even_voxels() {
        let mut image = Image::new_scalar(5, 4, 3).unwrap();
        image.set(2, 2, 2, 0.5);
        let down = decimate_half(&image);
        assert_eq!(down.dims(), (3, 2, 2));
        assert_eq!(down.at(1, 1, 1), 0.5);
    }
}
