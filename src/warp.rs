//! Perspective warp of a candidate image into the template frame.

use crate::homography::{project_point, Homography};
use crate::trace::{trace_event, trace_span};
use crate::util::{AlignError, AlignResult};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into_with, Interpolation};

const FILL: Rgb<u8> = Rgb([0, 0, 0]);
const EDGE_EPSILON: f64 = 1e-6;

/// Resamples candidates onto a canvas of the template's size.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageAligner;

impl ImageAligner {
    pub fn new() -> Self {
        Self
    }

    /// Warps `candidate` through `h` onto a `width` x `height` canvas.
    ///
    /// Every output pixel is mapped through `H⁻¹` into the candidate and
    /// sampled bilinearly. Samples outside the candidate, at infinity, or
    /// under a non-invertible `h` are black.
    pub fn warp(
        &self,
        candidate: &RgbImage,
        h: &Homography,
        width: u32,
        height: u32,
    ) -> AlignResult<RgbImage> {
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidDimensions {
                width: width as usize,
                height: height as usize,
            });
        }
        let _span = trace_span!("warp", width = width, height = height).entered();

        let mut out = RgbImage::from_pixel(width, height, FILL);
        let (src_w, src_h) = candidate.dimensions();
        let Some(inv) = h.inverse() else {
            trace_event!("warp_singular", width = width, height = height);
            return Ok(out);
        };
        if src_w == 0 || src_h == 0 {
            return Ok(out);
        }

        // The bilinear sampler needs a right and bottom neighbour even on the
        // last column and row, so the source gets one replicated column and
        // row. Coordinates past the real edge are rejected by the mapping.
        let padded = RgbImage::from_fn(src_w + 1, src_h + 1, |x, y| {
            *candidate.get_pixel(x.min(src_w - 1), y.min(src_h - 1))
        });
        let max_x = f64::from(src_w - 1);
        let max_y = f64::from(src_h - 1);
        let mapping = |x: f32, y: f32| match project_point(&inv, [x.into(), y.into()]) {
            Some([sx, sy])
                if (-EDGE_EPSILON..=max_x + EDGE_EPSILON).contains(&sx)
                    && (-EDGE_EPSILON..=max_y + EDGE_EPSILON).contains(&sy) =>
            {
                (sx.clamp(0.0, max_x) as f32, sy.clamp(0.0, max_y) as f32)
            }
            _ => (f32::NAN, f32::NAN),
        };
        warp_into_with(&padded, mapping, Interpolation::Bilinear, FILL, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::ImageAligner;
    use crate::homography::Homography;
    use image::{Rgb, RgbImage};
    use nalgebra::Matrix3;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8])
        })
    }

    #[test]
    fn identity_warp_copies_pixels() {
        let src = gradient(40, 30);
        let out = ImageAligner::new()
            .warp(&src, &Homography::identity(), 40, 30)
            .unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn translation_fills_uncovered_pixels_black() {
        let src = gradient(40, 30);
        // Candidate pixel (x, y) lands at template (x + 10, y).
        let h = Homography::new(
            Matrix3::new(1.0, 0.0, 10.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
            Vec::new(),
        );
        let out = ImageAligner::new().warp(&src, &h, 40, 30).unwrap();
        assert_eq!(out.get_pixel(5, 5), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(15, 5), src.get_pixel(5, 5));
        assert_eq!(out.get_pixel(39, 29), src.get_pixel(29, 29));
        assert_eq!(out.dimensions(), (40, 30));
    }

    #[test]
    fn canvas_larger_than_candidate_is_black_outside() {
        let src = gradient(20, 10);
        let out = ImageAligner::new()
            .warp(&src, &Homography::identity(), 30, 15)
            .unwrap();
        assert_eq!(out.get_pixel(19, 9), src.get_pixel(19, 9));
        assert_eq!(out.get_pixel(20, 5), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(5, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn half_pixel_shift_blends_neighbours() {
        let src = RgbImage::from_fn(4, 1, |x, _| Rgb([(x * 60) as u8; 3]));
        let h = Homography::new(
            Matrix3::new(1.0, 0.0, -0.5, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
            Vec::new(),
        );
        let out = ImageAligner::new().warp(&src, &h, 4, 1).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([30; 3]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([90; 3]));
        // Maps to x = 3.5, past the last source column.
        assert_eq!(out.get_pixel(3, 0), &Rgb([0; 3]));
    }

    #[test]
    fn singular_transform_yields_black_canvas() {
        let src = gradient(20, 20);
        let h = Homography::new(Matrix3::zeros(), Vec::new());
        let out = ImageAligner::new().warp(&src, &h, 8, 6).unwrap();
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn zero_sized_canvas_is_rejected() {
        let src = gradient(4, 4);
        assert!(ImageAligner::new()
            .warp(&src, &Homography::identity(), 0, 4)
            .is_err());
    }
}
