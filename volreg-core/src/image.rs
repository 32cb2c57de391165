use crate::{Error, Result};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A dense volumetric image: a 4D `(x, y, z, channel)` buffer of `f32`.
///
/// This is a thin wrapper around a contiguous vector with explicit strides.
/// We keep our own container rather than reusing an image or tensor crate
/// because every hot loop in the pyramid and descriptor code indexes the
/// buffer directly, and the strided flat layout lets those loops hoist the
/// index arithmetic. The channel axis is the fastest-varying one, so a
/// single-channel volume is simply a contiguous x-fastest scalar grid.
///
/// The default stride invariants are `xs = nc`, `ys = nc * nx`,
/// `zs = nc * nx * ny`, `cs = 1`, and `data.len() == nc * nx * ny * nz`.
/// A default-constructed image owns no buffer and has all dimensions zero.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Image {
    nx: usize,
    ny: usize,
    nz: usize,
    nc: usize,
    xs: usize,
    ys: usize,
    zs: usize,
    cs: usize,
    ux: f64,
    uy: f64,
    uz: f64,
    data: Vec<f32>,
}

impl Image {
    /// Allocate a zero-filled volume with unit voxel spacing.
    pub fn new(nx: usize, ny: usize, nz: usize, nc: usize) -> Result<Self> {
        if nx == 0 || ny == 0 || nz == 0 || nc == 0 {
            return Err(Error::BadDimensions {
                got: (nx, ny, nz, nc),
                requirement: "all dimensions must be nonzero",
            });
        }
        Ok(Self {
            nx,
            ny,
            nz,
            nc,
            xs: nc,
            ys: nc * nx,
            zs: nc * nx * ny,
            cs: 1,
            ux: 1.0,
            uy: 1.0,
            uz: 1.0,
            data: vec![0f32; nc * nx * ny * nz],
        })
    }

    /// Allocate a single-channel volume, the common case in this workspace.
    pub fn new_scalar(nx: usize, ny: usize, nz: usize) -> Result<Self> {
        Self::new(nx, ny, nz, 1)
    }

    /// Take ownership of an existing buffer laid out with the default strides.
    pub fn from_data(nx: usize, ny: usize, nz: usize, nc: usize, data: Vec<f32>) -> Result<Self> {
        let mut image = Self::new(nx, ny, nz, nc)?;
        if data.len() != image.data.len() {
            return Err(Error::BadDimensions {
                got: (nx, ny, nz, nc),
                requirement: "buffer length must equal nc * nx * ny * nz",
            });
        }
        image.data = data;
        Ok(image)
    }

    /// Set the physical voxel spacing, in physical units per voxel.
    #[must_use]
    pub fn with_spacing(mut self, ux: f64, uy: f64, uz: f64) -> Self {
        self.ux = ux;
        self.uy = uy;
        self.uz = uz;
        self
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    pub fn nc(&self) -> usize {
        self.nc
    }

    /// Spatial dimensions `(nx, ny, nz)`.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Element strides `(xs, ys, zs, cs)`.
    pub fn strides(&self) -> (usize, usize, usize, usize) {
        (self.xs, self.ys, self.zs, self.cs)
    }

    /// Physical voxel spacing `(ux, uy, uz)`.
    pub fn spacing(&self) -> (f64, f64, f64) {
        (self.ux, self.uy, self.uz)
    }

    /// The smallest spatial dimension.
    pub fn min_dim(&self) -> usize {
        self.nx.min(self.ny).min(self.nz)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline(always)]
    fn index(&self, x: usize, y: usize, z: usize, c: usize) -> usize {
        x * self.xs + y * self.ys + z * self.zs + c * self.cs
    }

    #[inline(always)]
    pub fn get(&self, x: usize, y: usize, z: usize, c: usize) -> f32 {
        self.data[self.index(x, y, z, c)]
    }

    #[inline(always)]
    pub fn put(&mut self, x: usize, y: usize, z: usize, c: usize, value: f32) {
        let i = self.index(x, y, z, c);
        self.data[i] = value;
    }

    /// Channel-0 read, the scalar fast path used by the feature code.
    #[inline(always)]
    pub fn at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[x * self.xs + y * self.ys + z * self.zs]
    }

    #[inline(always)]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let i = x * self.xs + y * self.ys + z * self.zs;
        self.data[i] = value;
    }

    /// Zero-pad to the requested spatial dimensions, which must each be at
    /// least as large as this image's. The source voxels land at the origin
    /// corner; spacing and channel count are preserved.
    pub fn padded_to(&self, nx: usize, ny: usize, nz: usize) -> Result<Self> {
        if nx < self.nx || ny < self.ny || nz < self.nz {
            return Err(Error::BadDimensions {
                got: (nx, ny, nz, self.nc),
                requirement: "padded dimensions must not shrink the volume",
            });
        }
        let mut out = Self::new(nx, ny, nz, self.nc)?.with_spacing(self.ux, self.uy, self.uz);
        for z in 0..self.nz {
            for y in 0..self.ny {
                let src = self.index(0, y, z, 0);
                let dst = out.index(0, y, z, 0);
                out.data[dst..dst + self.nx * self.nc]
                    .copy_from_slice(&self.data[src..src + self.nx * self.nc]);
            }
        }
        Ok(out)
    }
}

/// The element-wise maximum of two volumes' spatial dimensions; used to pick
/// a common padded shape before registration.
pub fn common_dims(a: &Image, b: &Image) -> (usize, usize, usize) {
    (
        a.nx().max(b.nx()),
        a.ny().max(b.ny()),
        a.nz().max(b.nz()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_image_owns_no_buffer() {
        let image = Image::default();
        assert_eq!(image.dims(), (0, 0, 0));
        assert!(image.data().is_empty());
    }

    #[test]
    fn strides_satisfy_invariants() {
        let image = Image::new(5, 7, 3, 2).unwrap();
        assert_eq!(image.strides(), (2, 10, 70, 1));
        assert_eq!(image.data().len(), 2 * 5 * 7 * 3);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(matches!(
            Image::new(0, 4, 4, 1),
            Err(Error::BadDimensions { .. })
        ));
    }

    #[test]
    fn get_put_round_trip() {
        let mut image = Image::new(4, 4, 4, 2).unwrap();
        image.put(1, 2, 3, 1, 0.5);
        assert_eq!(image.get(1, 2, 3, 1), 0.5);
        assert_eq!(image.get(1, 2, 3, 0), 0.0);
    }

    #[test]
    fn padding_places_source_at_origin() {
        let mut small = Image::new_scalar(2, 2, 2).unwrap();
        small.set(1, 1, 1, 0.25);
        let padded = small.padded_to(4, 3, 2).unwrap();
        assert_eq!(padded.dims(), (4, 3, 2));
        assert_eq!(padded.at(1, 1, 1), 0.25);
        assert_eq!(padded.at(3, 2, 1), 0.0);
    }

    #[test]
    fn padding_cannot_shrink() {
        let image = Image::new_scalar(4, 4, 4).unwrap();
        assert!(image.padded_to(3, 4, 4).is_err());
    }

    #[test]
    fn common_dims_takes_the_maximum() {
        let a = Image::new_scalar(10, 4, 6).unwrap();
        let b = Image::new_scalar(8, 9, 6).unwrap();
        assert_eq!(common_dims(&a, &b), (10, 9, 6));
    }
}
