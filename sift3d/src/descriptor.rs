//! Rotation-normalized gradient-orientation descriptors: a 4x4x4 spatial
//! grid of icosahedral orientation histograms sampled in each keypoint's
//! local frame.

use crate::mesh::OrientationMesh;
use crate::orientation::gradient;
use crate::pyramid::Pyramid;
use crate::Sift3d;
use derive_more::{Deref, DerefMut};
use log::*;
use nalgebra::{Point3, Vector3};
use volreg_core::{Keypoint, KeypointStore};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Spatial histogram bins per axis.
const NUM_SPATIAL_BINS: usize = 4;

/// Region radius as a multiple of the keypoint scale: `sqrt(3) * 2 * sigma`.
const REGION_RADIUS_FACTOR: f64 = 3.464_101_615_137_755;

/// SIFT-standard clipping threshold applied between the two normalizations.
const CLIP_THRESHOLD: f32 = 0.2;

/// A descriptor: the keypoint's base-frame position and scale, the index of
/// the keypoint it was extracted from, and the flattened histogram of
/// length `64 * num_vertices`.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub point: Point3<f64>,
    pub sigma: f64,
    pub keypoint: usize,
    pub histogram: Vec<f32>,
}

/// A contiguous collection of descriptors with a uniform histogram length.
#[derive(Debug, Clone, Default, Deref, DerefMut)]
pub struct DescriptorStore(pub Vec<Descriptor>);

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The histogram length shared by every descriptor, or `None` when
    /// empty.
    pub fn histogram_len(&self) -> Option<usize> {
        self.0.first().map(|descriptor| descriptor.histogram.len())
    }
}

impl Sift3d {
    /// Extract a descriptor for every keypoint, in keypoint-store order.
    /// Keypoints whose support region leaves the volume entirely or carries
    /// no gradient signal are dropped silently, exactly like detection
    /// candidates.
    pub fn extract_descriptors(
        &self,
        gss: &Pyramid,
        keypoints: &KeypointStore,
        mesh: &OrientationMesh,
    ) -> DescriptorStore {
        #[cfg(not(feature = "rayon"))]
        let descriptors = keypoints
            .iter()
            .enumerate()
            .filter_map(|(index, keypoint)| self.descriptor_at(gss, mesh, index, keypoint))
            .collect();
        #[cfg(feature = "rayon")]
        let descriptors = keypoints
            .par_iter()
            .enumerate()
            .filter_map(|(index, keypoint)| self.descriptor_at(gss, mesh, index, keypoint))
            .collect();
        let store = DescriptorStore(descriptors);
        debug!(
            "{}/{} descriptors extracted.",
            store.len(),
            keypoints.len()
        );
        store
    }

    /// Compute one descriptor in the keypoint's local frame.
    fn descriptor_at(
        &self,
        gss: &Pyramid,
        mesh: &OrientationMesh,
        index: usize,
        keypoint: &Keypoint,
    ) -> Option<Descriptor> {
        let num_vertices = mesh.num_vertices();
        let (o, l) = gss.nearest_level_log_sigma(keypoint.sigma);
        let level = gss.level(o, l);
        let image = &level.image;
        let (nx, ny, nz) = image.dims();

        // Octave-o coordinates are base coordinates scaled by 2^(1 - o).
        let scale_to_base = 2f64.powi(level.octave as i32 - 1);
        let center = keypoint.point / scale_to_base;
        let sigma = keypoint.sigma / scale_to_base;
        let radius = REGION_RADIUS_FACTOR * sigma;
        let weight_sigma = radius / 2.0;
        // Rotate offsets and gradients into the keypoint frame.
        let to_frame = keypoint.frame.inverse();

        let mut histogram = if self.dense_histogram {
            vec![0f32; num_vertices]
        } else {
            vec![0f32; NUM_SPATIAL_BINS * NUM_SPATIAL_BINS * NUM_SPATIAL_BINS * num_vertices]
        };
        let lo = |c: f64| ((c - radius).ceil() as isize).max(1);
        let hi = |c: f64, n: usize| ((c + radius).floor() as isize).min(n as isize - 2);
        for z in lo(center.z)..=hi(center.z, nz) {
            for y in lo(center.y)..=hi(center.y, ny) {
                for x in lo(center.x)..=hi(center.x, nx) {
                    let offset = Vector3::new(
                        x as f64 - center.x,
                        y as f64 - center.y,
                        z as f64 - center.z,
                    );
                    let local = to_frame * offset;
                    if local.x.abs() >= radius
                        || local.y.abs() >= radius
                        || local.z.abs() >= radius
                    {
                        continue;
                    }

                    let g = to_frame * gradient(image, x as usize, y as usize, z as usize);
                    let magnitude = g.norm();
                    if magnitude <= f64::MIN_POSITIVE {
                        continue;
                    }
                    let Some((face, barycentric)) = mesh.locate(&(g / magnitude)) else {
                        continue;
                    };
                    let weight = magnitude
                        * (-offset.norm_squared() / (2.0 * weight_sigma * weight_sigma)).exp();

                    if self.dense_histogram {
                        for (&vertex, &vertex_weight) in face.iter().zip(barycentric.iter()) {
                            histogram[vertex] += (weight * vertex_weight) as f32;
                        }
                        continue;
                    }

                    // Fractional spatial bin coordinates in [−0.5, 3.5).
                    let bin = |component: f64| {
                        (component + radius) * NUM_SPATIAL_BINS as f64 / (2.0 * radius) - 0.5
                    };
                    let (bx, by, bz) = (bin(local.x), bin(local.y), bin(local.z));
                    let (ix, iy, iz) =
                        (bx.floor() as isize, by.floor() as isize, bz.floor() as isize);
                    let (fx, fy, fz) = (bx - ix as f64, by - iy as f64, bz - iz as f64);

                    // Trilinear distribution over the eight neighboring
                    // spatial bins, then barycentric over the face vertices.
                    for dx in 0..2isize {
                        let sx = ix + dx;
                        if !(0..NUM_SPATIAL_BINS as isize).contains(&sx) {
                            continue;
                        }
                        let wx = if dx == 0 { 1.0 - fx } else { fx };
                        for dy in 0..2isize {
                            let sy = iy + dy;
                            if !(0..NUM_SPATIAL_BINS as isize).contains(&sy) {
                                continue;
                            }
                            let wy = if dy == 0 { 1.0 - fy } else { fy };
                            for dz in 0..2isize {
                                let sz = iz + dz;
                                if !(0..NUM_SPATIAL_BINS as isize).contains(&sz) {
                                    continue;
                                }
                                let wz = if dz == 0 { 1.0 - fz } else { fz };
                                let spatial = ((sx as usize * NUM_SPATIAL_BINS + sy as usize)
                                    * NUM_SPATIAL_BINS
                                    + sz as usize)
                                    * num_vertices;
                                let contribution = weight * wx * wy * wz;
                                for (&vertex, &vertex_weight) in
                                    face.iter().zip(barycentric.iter())
                                {
                                    histogram[spatial + vertex] +=
                                        (contribution * vertex_weight) as f32;
                                }
                            }
                        }
                    }
                }
            }
        }

        normalize_and_clip(&mut histogram)?;
        Some(Descriptor {
            point: keypoint.point,
            sigma: keypoint.sigma,
            keypoint: index,
            histogram,
        })
    }
}

/// L2-normalize, clip every component at [`CLIP_THRESHOLD`], and
/// re-normalize. Returns `None` for an empty (zero) histogram.
fn normalize_and_clip(histogram: &mut [f32]) -> Option<()> {
    let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::MIN_POSITIVE {
        return None;
    }
    for value in histogram.iter_mut() {
        *value = (*value / norm).min(CLIP_THRESHOLD);
    }
    let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::MIN_POSITIVE {
        return None;
    }
    for value in histogram.iter_mut() {
        *value /= norm;
    }
    Some(())
}
