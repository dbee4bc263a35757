//! Direct linear transform with Hartley normalization.

use nalgebra::{Matrix3, SMatrix, SVector};

/// Translates the centroid to the origin and scales the mean distance to √2.
fn normalize_points(points: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();
    (t, normalized)
}

/// Fits `H` with `dst ≈ H · src` from four or more pairs.
///
/// The solution is the eigenvector of the smallest eigenvalue of `AᵀA`,
/// accumulated directly as a 9x9 matrix. Returns `None` for fewer than four
/// pairs, mismatched inputs or a numerically unusable result. The matrix is
/// scaled so that `H[2,2] == 1` whenever that entry is not vanishing.
pub fn fit_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Matrix3<f64>> {
    if src.len() < 4 || src.len() != dst.len() {
        return None;
    }
    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (s, d) in src_n.iter().zip(&dst_n) {
        let (sx, sy) = (s[0], s[1]);
        let (dx, dy) = (d[0], d[1]);
        let r0 = SVector::<f64, 9>::from_row_slice(&[
            0.0, 0.0, 0.0, -sx, -sy, -1.0, dy * sx, dy * sy, dy,
        ]);
        let r1 = SVector::<f64, 9>::from_row_slice(&[
            sx, sy, 1.0, 0.0, 0.0, 0.0, -dx * sx, -dx * sy, -dx,
        ]);
        ata += r0 * r0.transpose();
        ata += r1 * r1.transpose();
    }

    let eig = ata.symmetric_eigen();
    let mut min_idx = 0;
    for i in 1..9 {
        if eig.eigenvalues[i].abs() < eig.eigenvalues[min_idx].abs() {
            min_idx = i;
        }
    }
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst.try_inverse()?;
    let mut out = t_dst_inv * h_norm * t_src;
    let scale = out[(2, 2)];
    if scale.abs() > 1e-12 {
        out /= scale;
    }
    out.iter().all(|v| v.is_finite()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::fit_dlt;
    use crate::homography::project_point;
    use nalgebra::Matrix3;

    fn truth() -> Matrix3<f64> {
        Matrix3::new(0.9, -0.2, 40.0, 0.15, 1.1, -12.0, 1e-4, -5e-5, 1.0)
    }

    #[test]
    fn four_points_are_fitted_exactly() {
        let h = truth();
        let src = [[0.0, 0.0], [200.0, 0.0], [200.0, 150.0], [0.0, 150.0]];
        let dst: Vec<[f64; 2]> = src.iter().map(|p| project_point(&h, *p).unwrap()).collect();
        let fitted = fit_dlt(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = project_point(&fitted, *s).unwrap();
            assert!((p[0] - d[0]).abs() < 1e-6 && (p[1] - d[1]).abs() < 1e-6);
        }
        assert!((fitted - h).abs().max() < 1e-6);
    }

    #[test]
    fn too_few_points_fail() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert!(fit_dlt(&pts, &pts).is_none());
    }
}
