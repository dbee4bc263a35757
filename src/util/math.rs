//! Mathematical helpers for orientation estimation and geometry.

use std::f32::consts::TAU;

/// Wraps an angle in radians to the range [0, 2π).
pub(crate) fn wrap_rad(angle: f32) -> f32 {
    let mut wrapped = angle % TAU;
    if wrapped < 0.0 {
        wrapped += TAU;
    }
    if wrapped >= TAU {
        wrapped -= TAU;
    }
    wrapped
}

/// Estimates the sub-sample peak offset for a quadratic fit.
///
/// Given samples at `x = -1, 0, +1` (`fm`, `f0`, `fp`), this returns the peak
/// offset `dx` in `[-1, 1]` when the fitted parabola is concave and stable.
pub(crate) fn quad_peak_offset_1d(fm: f32, f0: f32, fp: f32) -> Option<f32> {
    if !fm.is_finite() || !f0.is_finite() || !fp.is_finite() {
        return None;
    }

    let denom = fm - 2.0 * f0 + fp;
    if denom.abs() < 1e-6 || denom >= 0.0 {
        return None;
    }

    let dx = 0.5 * (fm - fp) / denom;
    if dx.is_finite() && dx.abs() <= 1.0 {
        Some(dx)
    } else {
        None
    }
}

/// Twice the signed area of the triangle `(a, b, c)`.
pub(crate) fn cross2(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

#[cfg(test)]
mod tests {
    use super::{cross2, quad_peak_offset_1d, wrap_rad};
    use std::f32::consts::{PI, TAU};

    #[test]
    fn wrap_rad_maps_to_expected_range() {
        assert!((wrap_rad(-PI) - PI).abs() < 1e-6);
        assert!((wrap_rad(TAU + 0.5) - 0.5).abs() < 1e-5);
        assert!(wrap_rad(TAU) < 1e-6);
    }

    #[test]
    fn quad_peak_offset_shifted() {
        let f = |x: f32| 1.0 - (x - 0.25).powi(2);
        let dx = quad_peak_offset_1d(f(-1.0), f(0.0), f(1.0)).unwrap();
        assert!((dx - 0.25).abs() < 1e-5);
    }

    #[test]
    fn quad_peak_offset_non_concave() {
        assert!(quad_peak_offset_1d(1.0, 0.5, 1.0).is_none());
    }

    #[test]
    fn cross2_sign_follows_orientation() {
        assert!(cross2([0.0, 0.0], [1.0, 0.0], [0.0, 1.0]) > 0.0);
        assert_eq!(cross2([0.0, 0.0], [1.0, 1.0], [2.0, 2.0]), 0.0);
    }
}
