//! Zero-mean normalized cross-correlation between grayscale patches.
//!
//! A [`PatchPlan`] precomputes the zero-mean reference patch once; a
//! [`Kernel`] scores it against every placement inside a search view of at
//! least the same size. Scores lie in `[-1, 1]`.
//!
//! Zero-variance windows get a defined score instead of a division by zero:
//! two flat patches whose means differ by at most [`FLAT_MEAN_TOLERANCE`]
//! score `1.0`, any other pairing that involves a flat patch scores `0.0`.

pub(crate) mod scalar;

use crate::image::ImageView;
use crate::util::{AlignError, AlignResult};

pub use scalar::ZnccScalar;

/// Sum of squared deviations below which a patch is considered flat.
pub const FLAT_VARIANCE: f64 = 1e-6;

/// Largest mean difference (gray levels) at which two flat patches match.
pub const FLAT_MEAN_TOLERANCE: f64 = 1.0;

/// Precomputed statistics and zero-mean buffer for a reference patch.
#[derive(Clone, Debug)]
pub struct PatchPlan {
    width: usize,
    height: usize,
    mean: f64,
    var_t: f64,
    zero_mean: Vec<f64>,
}

impl PatchPlan {
    /// Builds a plan from a reference view.
    pub fn from_view(patch: ImageView<'_, u8>) -> AlignResult<Self> {
        let width = patch.width();
        let height = patch.height();
        let count = width
            .checked_mul(height)
            .ok_or(AlignError::InvalidDimensions { width, height })?;

        let mut sum = 0.0f64;
        for y in 0..height {
            let row = patch.row(y).ok_or(AlignError::BufferTooSmall {
                needed: count,
                got: y * width,
            })?;
            sum += row.iter().map(|&v| v as f64).sum::<f64>();
        }
        let mean = sum / count as f64;

        let mut zero_mean = Vec::with_capacity(count);
        let mut var_t = 0.0f64;
        for y in 0..height {
            let row = patch.row(y).ok_or(AlignError::BufferTooSmall {
                needed: count,
                got: y * width,
            })?;
            for &value in row {
                let d = value as f64 - mean;
                var_t += d * d;
                zero_mean.push(d);
            }
        }

        Ok(Self {
            width,
            height,
            mean,
            var_t,
            zero_mean,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Mean intensity of the reference patch.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sum of squared deviations from the mean.
    pub fn var_t(&self) -> f64 {
        self.var_t
    }

    /// True when the reference patch has (numerically) zero variance.
    pub fn is_flat(&self) -> bool {
        self.var_t <= FLAT_VARIANCE
    }

    /// Zero-mean reference values in row-major order.
    pub fn zero_mean(&self) -> &[f64] {
        &self.zero_mean
    }
}

/// Best-scoring placement of a plan inside a search view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Left column of the placement inside the search view.
    pub x: usize,
    /// Top row of the placement inside the search view.
    pub y: usize,
    /// Correlation score in `[-1, 1]`.
    pub score: f32,
}

/// Correlation scoring over placements.
pub trait Kernel {
    /// Score with the plan's top-left corner at `(x, y)` of `image`.
    fn score_at(image: ImageView<'_, u8>, plan: &PatchPlan, x: usize, y: usize) -> f32;

    /// Highest-scoring placement over the full valid range; ties keep the
    /// first placement in raster order.
    fn best_placement(image: ImageView<'_, u8>, plan: &PatchPlan) -> AlignResult<Placement>;
}

#[cfg(test)]
mod tests {
    use super::{Kernel, PatchPlan, ZnccScalar};
    use crate::image::ImageView;

    fn textured(width: usize, height: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| {
                let x = i % width;
                let y = i / width;
                ((x * 37 + y * 91 + (x * y) % 13) % 251) as u8
            })
            .collect()
    }

    #[test]
    fn identical_patch_scores_one() {
        let data = textured(24, 18);
        let view = ImageView::from_slice(&data, 24, 18).unwrap();
        let plan = PatchPlan::from_view(view).unwrap();
        let score = ZnccScalar::score_at(view, &plan, 0, 0);
        assert!((score - 1.0).abs() < 1e-6, "{score}");
    }

    #[test]
    fn inverted_patch_scores_minus_one() {
        let data = textured(16, 16);
        let inverted: Vec<u8> = data.iter().map(|v| 255 - v).collect();
        let plan = PatchPlan::from_view(ImageView::from_slice(&data, 16, 16).unwrap()).unwrap();
        let view = ImageView::from_slice(&inverted, 16, 16).unwrap();
        let score = ZnccScalar::score_at(view, &plan, 0, 0);
        assert!((score + 1.0).abs() < 1e-6, "{score}");
    }

    #[test]
    fn best_placement_finds_embedded_patch() {
        let data = textured(40, 30);
        let image = ImageView::from_slice(&data, 40, 30).unwrap();
        let patch = image.roi(9, 6, 12, 10).unwrap();
        let plan = PatchPlan::from_view(patch).unwrap();
        let best = ZnccScalar::best_placement(image, &plan).unwrap();
        assert_eq!((best.x, best.y), (9, 6));
        assert!(best.score > 0.999);
    }

    #[test]
    fn flat_patches_compare_by_mean() {
        let a = vec![100u8; 64];
        let b = vec![101u8; 64];
        let c = vec![140u8; 64];
        let plan = PatchPlan::from_view(ImageView::from_slice(&a, 8, 8).unwrap()).unwrap();
        assert!(plan.is_flat());
        let near = ZnccScalar::score_at(ImageView::from_slice(&b, 8, 8).unwrap(), &plan, 0, 0);
        let far = ZnccScalar::score_at(ImageView::from_slice(&c, 8, 8).unwrap(), &plan, 0, 0);
        assert_eq!(near, 1.0);
        assert_eq!(far, 0.0);

        let tex = textured(8, 8);
        let mixed = ZnccScalar::score_at(ImageView::from_slice(&tex, 8, 8).unwrap(), &plan, 0, 0);
        assert_eq!(mixed, 0.0);
    }

    #[test]
    fn search_view_smaller_than_plan_is_rejected() {
        let data = textured(10, 10);
        let plan = PatchPlan::from_view(ImageView::from_slice(&data, 10, 10).unwrap()).unwrap();
        let small = ImageView::from_slice(&data[..64], 8, 8).unwrap();
        assert!(ZnccScalar::best_placement(small, &plan).is_err());
    }
}
