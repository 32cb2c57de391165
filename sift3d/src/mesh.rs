//! The icosahedral orientation tessellation: a near-uniform partition of the
//! unit sphere into spherical triangles, used to bin gradient directions.

use nalgebra::{Matrix3, Vector3};
use std::collections::HashMap;

/// Golden ratio, for the icosahedron vertex table.
const PHI: f64 = 1.618_033_988_749_895;

/// Icosahedron vertices before normalization.
const ICOSAHEDRON_VERTICES: [[f64; 3]; 12] = [
    [-1.0, PHI, 0.0],
    [1.0, PHI, 0.0],
    [-1.0, -PHI, 0.0],
    [1.0, -PHI, 0.0],
    [0.0, -1.0, PHI],
    [0.0, 1.0, PHI],
    [0.0, -1.0, -PHI],
    [0.0, 1.0, -PHI],
    [PHI, 0.0, -1.0],
    [PHI, 0.0, 1.0],
    [-PHI, 0.0, -1.0],
    [-PHI, 0.0, 1.0],
];

/// Icosahedron faces, counter-clockwise seen from outside.
const ICOSAHEDRON_FACES: [[usize; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

/// A subdivided icosahedron covering the unit sphere. Subdivision level `n`
/// splits every face into `4^n` spherical triangles; each vertex is one
/// orientation bin of the descriptor histogram.
#[derive(Debug, Clone)]
pub struct OrientationMesh {
    vertices: Vec<Vector3<f64>>,
    faces: Vec<[usize; 3]>,
    // Inverse of the vertex-column matrix per face, precomputed for the
    // barycentric containment test.
    inverses: Vec<Matrix3<f64>>,
}

impl OrientationMesh {
    /// Build the mesh at the given subdivision level. Level 0 is the plain
    /// icosahedron (12 vertices, 20 faces); level 1 has 42 vertices and 80
    /// faces.
    pub fn new(subdivisions: usize) -> Self {
        let mut vertices: Vec<Vector3<f64>> = ICOSAHEDRON_VERTICES
            .iter()
            .map(|v| Vector3::new(v[0], v[1], v[2]).normalize())
            .collect();
        let mut faces: Vec<[usize; 3]> = ICOSAHEDRON_FACES.to_vec();

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
            let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vector3<f64>>| {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let mid = (vertices[a] + vertices[b]).normalize();
                    vertices.push(mid);
                    vertices.len() - 1
                })
            };
            let mut subdivided = Vec::with_capacity(faces.len() * 4);
            for &[v0, v1, v2] in &faces {
                let a = midpoint(v0, v1, &mut vertices);
                let b = midpoint(v1, v2, &mut vertices);
                let c = midpoint(v2, v0, &mut vertices);
                subdivided.push([v0, a, c]);
                subdivided.push([v1, b, a]);
                subdivided.push([v2, c, b]);
                subdivided.push([a, b, c]);
            }
            faces = subdivided;
        }

        let inverses = faces
            .iter()
            .map(|&[v0, v1, v2]| {
                Matrix3::from_columns(&[vertices[v0], vertices[v1], vertices[v2]])
                    .try_inverse()
                    .expect("sphere triangle vertices are linearly independent")
            })
            .collect();
        Self {
            vertices,
            faces,
            inverses,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex(&self, index: usize) -> &Vector3<f64> {
        &self.vertices[index]
    }

    /// Locate the spherical triangle containing a direction and return its
    /// vertex indices with the barycentric weights of the hit point
    /// (non-negative, summing to one). Directions on an edge resolve to the
    /// first containing face in the fixed face order, so the result is
    /// deterministic. Returns `None` only for a zero direction.
    pub fn locate(&self, direction: &Vector3<f64>) -> Option<([usize; 3], [f64; 3])> {
        const EDGE_TOLERANCE: f64 = -1e-9;
        for (face, inverse) in self.faces.iter().zip(&self.inverses) {
            let b = inverse * direction;
            if b.x >= EDGE_TOLERANCE && b.y >= EDGE_TOLERANCE && b.z >= EDGE_TOLERANCE {
                let sum = b.x + b.y + b.z;
                if sum <= 0.0 {
                    return None;
                }
                let weights = [
                    (b.x / sum).max(0.0),
                    (b.y / sum).max(0.0),
                    (b.z / sum).max(0.0),
                ];
                return Some((*face, weights));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    #[test]
    fn icosahedron_counts() {
        let mesh = OrientationMesh::new(0);
        assert_eq!(mesh.num_vertices(), 12);
        assert_eq!(mesh.num_faces(), 20);
    }

    #[test]
    fn one_subdivision_counts() {
        let mesh = OrientationMesh::new(1);
        assert_eq!(mesh.num_vertices(), 42);
        assert_eq!(mesh.num_faces(), 80);
    }

    #[test]
    fn vertices_are_unit_length() {
        let mesh = OrientationMesh::new(1);
        for i in 0..mesh.num_vertices() {
            assert!((mesh.vertex(i).norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn vertex_directions_hit_their_own_bin() {
        let mesh = OrientationMesh::new(1);
        for i in 0..mesh.num_vertices() {
            let (face, weights) = mesh.locate(&mesh.vertex(i).clone()).unwrap();
            let slot = face.iter().position(|&v| v == i).unwrap();
            assert!((weights[slot] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn every_direction_is_located_with_unit_weight_sum() {
        let mesh = OrientationMesh::new(1);
        let mut rng = Pcg64::seed_from_u64(7);
        for _ in 0..1000 {
            let direction = Vector3::new(
                rng.gen::<f64>() - 0.5,
                rng.gen::<f64>() - 0.5,
                rng.gen::<f64>() - 0.5,
            );
            if direction.norm() < 1e-3 {
                continue;
            }
            let direction = direction.normalize();
            let (face, weights) = mesh.locate(&direction).unwrap();
            let sum: f64 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            // The barycentric combination of the face vertices points back
            // along the query direction.
            let recombined = weights
                .iter()
                .zip(face.iter())
                .map(|(&w, &v)| mesh.vertex(v) * w)
                .sum::<Vector3<f64>>();
            assert!(recombined.normalize().dot(&direction) > 0.999);
        }
    }
}
