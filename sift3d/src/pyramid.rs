//! Gaussian scale space (GSS) and difference-of-Gaussians (DoG) pyramids.

use crate::filter::{decimate_half, gaussian_blur, upsample_double};
use crate::Sift3d;
use float_ord::FloatOrd;
use log::*;
use volreg_core::{Error, Image, Result};

/// One level of a pyramid: a single-channel volume tagged with its octave,
/// sub-level, and absolute blur.
#[derive(Debug, Clone)]
pub struct Level {
    pub octave: usize,
    pub sublevel: usize,
    /// Absolute blur in base-frame voxel units:
    /// `sigma0 * 2^(octave + sublevel / num_intervals)`.
    pub sigma: f64,
    pub image: Image,
}

/// An octave-major pyramid. The same structure holds both the GSS
/// (`num_intervals + 3` levels per octave) and the DoG
/// (`num_intervals + 2` levels per octave).
#[derive(Debug, Clone, Default)]
pub struct Pyramid {
    pub octaves: Vec<Vec<Level>>,
}

impl Pyramid {
    pub fn num_octaves(&self) -> usize {
        self.octaves.len()
    }

    pub fn octave(&self, o: usize) -> &[Level] {
        &self.octaves[o]
    }

    pub fn level(&self, o: usize, l: usize) -> &Level {
        &self.octaves[o][l]
    }

    /// The level whose absolute blur is nearest to `sigma` on the log-scale
    /// axis, as `(octave, sublevel)`.
    pub fn nearest_level_log_sigma(&self, sigma: f64) -> (usize, usize) {
        let target = sigma.max(f64::MIN_POSITIVE).ln();
        self.octaves
            .iter()
            .enumerate()
            .flat_map(|(o, levels)| levels.iter().enumerate().map(move |(l, level)| (o, l, level)))
            .min_by_key(|(_, _, level)| FloatOrd((level.sigma.ln() - target).abs()))
            .map(|(o, l, _)| (o, l))
            .expect("pyramid has at least one level")
    }
}

impl Sift3d {
    /// The number of octaves to build for a given input: the configured
    /// count, or the largest count keeping the smallest dimension of the
    /// last octave at least 8 voxels. Octave 0 is the 2x-upsampled input.
    fn octave_count(&self, image: &Image) -> Result<usize> {
        if let Some(count) = self.num_octaves {
            if count == 0 {
                return Err(Error::Config("num_octaves must be at least 1"));
            }
            return Ok(count);
        }
        let (mut nx, mut ny, mut nz) = image.dims();
        nx *= 2;
        ny *= 2;
        nz *= 2;
        let mut count = 0;
        while nx.min(ny).min(nz) >= 8 {
            count += 1;
            nx = (nx + 1) / 2;
            ny = (ny + 1) / 2;
            nz = (nz + 1) / 2;
        }
        if count == 0 {
            return Err(Error::BadDimensions {
                got: (image.nx(), image.ny(), image.nz(), image.nc()),
                requirement: "volume too small for even one octave",
            });
        }
        Ok(count)
    }

    /// Build the Gaussian scale space of a single-channel volume.
    ///
    /// The input is upsampled by 2x (assumed blur `2 * sigma_n`), brought to
    /// blur `sigma0`, then blurred incrementally so that level `l` of octave
    /// `o` carries absolute blur `sigma0 * 2^(o + l / num_intervals)`. Each
    /// next octave starts from the stride-2 decimation of the level with
    /// twice its base blur.
    pub fn build_gaussian_pyramid(&self, image: &Image) -> Result<Pyramid> {
        if self.num_intervals == 0 {
            return Err(Error::Config("num_intervals must be at least 1"));
        }
        if self.sigma0 <= 0.0 {
            return Err(Error::Config("sigma0 must be positive"));
        }
        let num_octaves = self.octave_count(image)?;
        let levels_per_octave = self.num_intervals + 3;
        let k = 2f64.powf(1.0 / self.num_intervals as f64);

        // Bring the upsampled input from its assumed blur to sigma0.
        let initial = (self.sigma0.powi(2) - (2.0 * self.sigma_n).powi(2))
            .max(0.0)
            .sqrt();
        let mut base = gaussian_blur(&upsample_double(image), initial);

        let mut octaves = Vec::with_capacity(num_octaves);
        for o in 0..num_octaves {
            let mut levels: Vec<Level> = Vec::with_capacity(levels_per_octave);
            debug!(
                "Octave {} shape {:?} with {} levels.",
                o,
                base.dims(),
                levels_per_octave
            );
            for l in 0..levels_per_octave {
                let image = if l == 0 {
                    std::mem::take(&mut base)
                } else {
                    // Incremental blur from the previous level.
                    let increment = self.sigma0 * k.powi(l as i32 - 1) * (k * k - 1.0).sqrt();
                    gaussian_blur(&levels[l - 1].image, increment)
                };
                levels.push(Level {
                    octave: o,
                    sublevel: l,
                    sigma: self.sigma0
                        * 2f64.powf(o as f64 + l as f64 / self.num_intervals as f64),
                    image,
                });
            }
            if o + 1 < num_octaves {
                // The level at index num_intervals has exactly twice the
                // octave's base blur.
                base = decimate_half(&levels[self.num_intervals].image);
            }
            octaves.push(levels);
        }
        Ok(Pyramid { octaves })
    }

    /// Build the DoG pyramid by voxel-wise subtraction of adjacent GSS
    /// levels: `dog[o][l] = gss[o][l + 1] - gss[o][l]`.
    pub fn build_dog_pyramid(&self, gss: &Pyramid) -> Pyramid {
        let octaves = gss
            .octaves
            .iter()
            .map(|levels| {
                levels
                    .windows(2)
                    .map(|pair| {
                        let (lower, upper) = (&pair[0], &pair[1]);
                        let mut image = upper.image.clone();
                        for (out, &low) in image.data_mut().iter_mut().zip(lower.image.data()) {
                            *out -= low;
                        }
                        Level {
                            octave: lower.octave,
                            sublevel: lower.sublevel,
                            sigma: lower.sigma,
                            image,
                        }
                    })
                    .collect()
            })
            .collect();
        Pyramid { octaves }
    }
}
