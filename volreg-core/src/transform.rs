use crate::{Error, PointMatch, Result};
use nalgebra::{DMatrix, Matrix3, Matrix3x4, Point3, Vector3};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Numerical zero for the least-squares pseudo-inverse.
const SVD_EPSILON: f64 = 1e-9;

/// The capability set shared by every parametric transform family.
///
/// The consensus engine is generic over this trait, so adding a new family
/// (rigid, similarity, ...) means implementing it here and nothing else.
/// Fitting is part of the family itself because each family has exactly one
/// least-squares fitting procedure.
pub trait TransformModel: Sized + Clone {
    /// The number of correspondences consumed per consensus sample.
    const MIN_SAMPLES: usize;

    /// Least-squares fit from matched point lists of equal length. Fails
    /// with [`Error::Numeric`] when the system is underdetermined or the
    /// solver cannot produce a solution.
    fn fit_from_points(src: &[Point3<f64>], dst: &[Point3<f64>]) -> Result<Self>;

    /// Map a point from the source frame to the reference frame.
    fn apply(&self, point: Point3<f64>) -> Point3<f64>;

    /// The inverse map, if it exists.
    fn inverse(&self) -> Result<Self>;

    /// The flattened parameter vector of the family.
    fn params(&self) -> Vec<f64>;

    /// Euclidean alignment error of one correspondence under this model.
    fn residual(&self, correspondence: &PointMatch) -> f64 {
        (self.apply(correspondence.0) - correspondence.1).norm()
    }
}

/// A 3D affine transform `y = A * x + t`, stored as the `3x4` matrix
/// `[A | t]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Affine {
    a: Matrix3<f64>,
    t: Vector3<f64>,
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            a: Matrix3::identity(),
            t: Vector3::zeros(),
        }
    }

    pub fn from_parts(a: Matrix3<f64>, t: Vector3<f64>) -> Self {
        Self { a, t }
    }

    /// The `3x4` row-major matrix `[A | t]`.
    pub fn matrix(&self) -> Matrix3x4<f64> {
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.a);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.t);
        m
    }

    pub fn from_matrix(m: Matrix3x4<f64>) -> Self {
        Self {
            a: m.fixed_view::<3, 3>(0, 0).into_owned(),
            t: m.fixed_view::<3, 1>(0, 3).into_owned(),
        }
    }

    pub fn linear(&self) -> &Matrix3<f64> {
        &self.a
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.t
    }
}

impl TransformModel for Affine {
    // Three correspondences determine an affine map, but a fourth sample
    // guards the minimal fit against numerically degenerate (near-coplanar)
    // triples; the fit is least squares over all four.
    const MIN_SAMPLES: usize = 4;

    fn fit_from_points(src: &[Point3<f64>], dst: &[Point3<f64>]) -> Result<Self> {
        if src.len() != dst.len() || src.len() < Self::MIN_SAMPLES {
            return Err(Error::Numeric {
                context: "underdetermined affine fit",
            });
        }
        // Row i of the system is [x y z 1] * B = [x' y' z'], with
        // B = [A^T; t^T]. Solve B with the SVD pseudo-inverse.
        let n = src.len();
        let x = DMatrix::from_fn(n, 4, |r, c| if c < 3 { src[r][c] } else { 1.0 });
        let y = DMatrix::from_fn(n, 3, |r, c| dst[r][c]);
        let b = x
            .pseudo_inverse(SVD_EPSILON)
            .map_err(|_| Error::Numeric {
                context: "affine pseudo-inverse",
            })?
            * y;
        let a = b.fixed_view::<3, 3>(0, 0).transpose();
        let t = b.fixed_view::<1, 3>(3, 0).transpose();
        Ok(Self { a, t })
    }

    fn apply(&self, point: Point3<f64>) -> Point3<f64> {
        Point3::from(self.a * point.coords + self.t)
    }

    fn inverse(&self) -> Result<Self> {
        let a_inv = self.a.try_inverse().ok_or(Error::Numeric {
            context: "singular affine matrix",
        })?;
        Ok(Self {
            a: a_inv,
            t: -a_inv * self.t,
        })
    }

    fn params(&self) -> Vec<f64> {
        let m = self.matrix();
        (0..3).flat_map(|r| (0..4).map(move |c| m[(r, c)])).collect()
    }
}

/// The interchange format: three lines of four whitespace-separated values,
/// one row of `[A | t]` per line.
impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.matrix();
        for r in 0..3 {
            writeln!(f, "{} {} {} {}", m[(r, 0)], m[(r, 1)], m[(r, 2)], m[(r, 3)])?;
        }
        Ok(())
    }
}

impl FromStr for Affine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<f64> = s
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| Error::Parse("expected a real number"))
            })
            .collect::<Result<_>>()?;
        if values.len() != 12 {
            return Err(Error::Parse("expected 12 whitespace-separated values"));
        }
        Ok(Self::from_matrix(Matrix3x4::from_row_slice(&values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn example() -> Affine {
        Affine::from_parts(
            Matrix3::new(0.9, -0.1, 0.0, 0.1, 1.1, 0.05, 0.0, -0.05, 1.0),
            Vector3::new(2.0, -3.0, 0.5),
        )
    }

    fn grid_points() -> Vec<Point3<f64>> {
        (0..2)
            .cartesian_product(0..2)
            .cartesian_product(0..2)
            .map(|((x, y), z)| Point3::new(x as f64 * 10.0, y as f64 * 10.0, z as f64 * 10.0))
            .collect()
    }

    #[test]
    fn fit_recovers_exact_affine() {
        let tform = example();
        let src = grid_points();
        let dst: Vec<_> = src.iter().map(|&p| tform.apply(p)).collect();
        let fit = Affine::fit_from_points(&src, &dst).unwrap();
        assert!((fit.matrix() - tform.matrix()).norm() < 1e-9);
    }

    #[test]
    fn fit_requires_min_samples() {
        let src = grid_points();
        let dst = grid_points();
        assert!(Affine::fit_from_points(&src[..3], &dst[..3]).is_err());
    }

    #[test]
    fn inverse_round_trips() {
        let tform = example();
        let inv = tform.inverse().unwrap();
        let p = Point3::new(4.0, -2.0, 7.0);
        assert!((inv.apply(tform.apply(p)) - p).norm() < 1e-12);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let tform = Affine::from_parts(Matrix3::zeros(), Vector3::zeros());
        assert!(matches!(tform.inverse(), Err(Error::Numeric { .. })));
    }

    #[test]
    fn ascii_round_trip_is_exact() {
        let tform = example();
        let restored: Affine = tform.to_string().parse().unwrap();
        assert_eq!(restored, tform);
    }

    #[test]
    fn parse_rejects_wrong_token_count() {
        assert!(matches!(
            "1 0 0 0\n0 1 0 0".parse::<Affine>(),
            Err(Error::Parse(_))
        ));
    }
}
