//! Projective transforms between candidate and template coordinates.
//!
//! A [`Homography`] maps candidate-image pixels to template-image pixels and
//! carries the inlier mask of the correspondences it was estimated from.
//! [`HomographyEstimator`] fits one robustly with RANSAC over minimal
//! four-point samples.

pub mod dlt;
mod ransac;

use nalgebra::{Matrix3, Vector3};

pub use ransac::{EstimateFailure, HomographyEstimator, RansacConfig};

/// Projects `p` through `h`, returning `None` at the line at infinity.
pub fn project_point(h: &Matrix3<f64>, p: [f64; 2]) -> Option<[f64; 2]> {
    let v = h * Vector3::new(p[0], p[1], 1.0);
    if v[2].abs() < 1e-12 {
        return None;
    }
    let out = [v[0] / v[2], v[1] / v[2]];
    (out[0].is_finite() && out[1].is_finite()).then_some(out)
}

/// A 3x3 candidate→template transform plus its inlier mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
    inlier_mask: Vec<bool>,
}

impl Homography {
    /// Wraps a matrix and a per-correspondence inlier mask.
    pub fn new(matrix: Matrix3<f64>, inlier_mask: Vec<bool>) -> Self {
        Self {
            matrix,
            inlier_mask,
        }
    }

    /// Returns the identity transform with an empty mask.
    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vec::new())
    }

    /// Returns the transform matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Returns one flag per input correspondence; `true` marks an inlier.
    pub fn inlier_mask(&self) -> &[bool] {
        &self.inlier_mask
    }

    /// Returns the number of inliers.
    pub fn inlier_count(&self) -> usize {
        self.inlier_mask.iter().filter(|&&inlier| inlier).count()
    }

    /// Maps a candidate point into template coordinates.
    pub fn project(&self, p: [f64; 2]) -> Option<[f64; 2]> {
        project_point(&self.matrix, p)
    }

    /// Returns the template→candidate matrix, if the transform is invertible.
    pub fn inverse(&self) -> Option<Matrix3<f64>> {
        self.matrix.try_inverse()
    }

    /// True when every entry of the `H[2,2]`-normalized matrix is within
    /// `tol` of the identity.
    pub fn is_near_identity(&self, tol: f64) -> bool {
        let scale = self.matrix[(2, 2)];
        if scale.abs() < 1e-12 {
            return false;
        }
        let normalized = self.matrix / scale;
        (normalized - Matrix3::identity()).abs().max() <= tol
    }

    /// Row-major copy of the matrix.
    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}
