//! Scalar reference kernel for ZNCC scoring.

use crate::image::ImageView;
use crate::kernel::{Kernel, PatchPlan, Placement, FLAT_MEAN_TOLERANCE, FLAT_VARIANCE};
use crate::util::{AlignError, AlignResult};

/// Scalar zero-mean normalized cross-correlation.
pub struct ZnccScalar;

impl Kernel for ZnccScalar {
    fn score_at(image: ImageView<'_, u8>, plan: &PatchPlan, x: usize, y: usize) -> f32 {
        let tpl_width = plan.width();
        let tpl_height = plan.height();
        if image.width() < tpl_width || image.height() < tpl_height {
            return f32::NEG_INFINITY;
        }
        if x > image.width() - tpl_width || y > image.height() - tpl_height {
            return f32::NEG_INFINITY;
        }

        let t_prime = plan.zero_mean();
        let mut dot = 0.0f64;
        let mut sum_i = 0.0f64;
        let mut sum_i2 = 0.0f64;
        for ty in 0..tpl_height {
            let Some(img_row) = image.row(y + ty) else {
                return f32::NEG_INFINITY;
            };
            let base = ty * tpl_width;
            for (tx, &value) in img_row[x..x + tpl_width].iter().enumerate() {
                let v = value as f64;
                dot += t_prime[base + tx] * v;
                sum_i += v;
                sum_i2 += v * v;
            }
        }

        let count = (tpl_width * tpl_height) as f64;
        let var_i = (sum_i2 - sum_i * sum_i / count).max(0.0);
        let flat_i = var_i <= FLAT_VARIANCE;
        match (plan.is_flat(), flat_i) {
            (true, true) => {
                let mean_i = sum_i / count;
                if (mean_i - plan.mean()).abs() <= FLAT_MEAN_TOLERANCE {
                    1.0
                } else {
                    0.0
                }
            }
            (true, false) | (false, true) => 0.0,
            (false, false) => {
                let score = dot / (plan.var_t() * var_i).sqrt();
                if score.is_finite() {
                    score.clamp(-1.0, 1.0) as f32
                } else {
                    0.0
                }
            }
        }
    }

    fn best_placement(image: ImageView<'_, u8>, plan: &PatchPlan) -> AlignResult<Placement> {
        let img_width = image.width();
        let img_height = image.height();
        if img_width < plan.width() || img_height < plan.height() {
            return Err(AlignError::RoiOutOfBounds {
                x: 0,
                y: 0,
                width: plan.width(),
                height: plan.height(),
                img_width,
                img_height,
            });
        }

        let max_x = img_width - plan.width();
        let max_y = img_height - plan.height();
        let mut best = Placement {
            x: 0,
            y: 0,
            score: f32::NEG_INFINITY,
        };
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = Self::score_at(image, plan, x, y);
                if score > best.score {
                    best = Placement { x, y, score };
                }
            }
        }
        Ok(best)
    }
}
