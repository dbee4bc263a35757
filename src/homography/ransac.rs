use super::dlt::fit_dlt;
use super::{project_point, Homography};
use crate::trace::{trace_event, trace_span};
use crate::util::math::cross2;
use crate::util::{AlignError, AlignResult};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use thiserror::Error;

/// Twice the triangle area (px²) below which three sample points count as
/// collinear.
const COLLINEAR_AREA: f64 = 1.0;
const SAMPLE_SIZE: usize = 4;

/// RANSAC parameters for homography estimation.
#[derive(Clone, Debug)]
pub struct RansacConfig {
    /// Maximum reprojection error (template pixels) for an inlier.
    pub threshold: f64,
    /// Upper bound on sampling iterations.
    pub max_iters: usize,
    /// Desired probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// Fewest correspondences the estimator accepts.
    pub min_correspondences: usize,
    /// Sampling seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            max_iters: 2000,
            confidence: 0.995,
            min_correspondences: 11,
            seed: None,
        }
    }
}

impl RansacConfig {
    pub(crate) fn validate(&self) -> AlignResult<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(AlignError::InvalidConfig(format!(
                "threshold must be > 0, got {}",
                self.threshold
            )));
        }
        if self.max_iters == 0 {
            return Err(AlignError::InvalidConfig(
                "max_iters must be at least 1".into(),
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(AlignError::InvalidConfig(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.min_correspondences < SAMPLE_SIZE {
            return Err(AlignError::InvalidConfig(format!(
                "min_correspondences must be at least {SAMPLE_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Why no homography was produced.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EstimateFailure {
    /// Fewer correspondences than `min_correspondences`.
    #[error("{found} correspondences, {required} required")]
    TooFew { found: usize, required: usize },
    /// Every sample was degenerate or the fit was singular.
    #[error("no non-degenerate homography")]
    Degenerate,
}

/// Robust homography fitting over point correspondences.
#[derive(Clone, Debug)]
pub struct HomographyEstimator {
    cfg: RansacConfig,
}

impl HomographyEstimator {
    pub fn new(cfg: RansacConfig) -> AlignResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &RansacConfig {
        &self.cfg
    }

    /// Fits `H` with `dst ≈ H · src` and returns it with the inlier mask.
    ///
    /// Samples of four pairs are drawn until the adaptive iteration bound is
    /// reached; samples with three nearly collinear points in either image
    /// are skipped. The best model is refit on all of its inliers and the
    /// mask recomputed with the refit matrix.
    pub fn estimate(
        &self,
        src: &[[f64; 2]],
        dst: &[[f64; 2]],
    ) -> Result<Homography, EstimateFailure> {
        let n = src.len().min(dst.len());
        let _span = trace_span!("estimate", correspondences = n).entered();
        if n < self.cfg.min_correspondences {
            return Err(EstimateFailure::TooFew {
                found: n,
                required: self.cfg.min_correspondences,
            });
        }

        let mut rng = match self.cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let threshold_sq = self.cfg.threshold * self.cfg.threshold;

        let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;
        let mut iters_needed = self.cfg.max_iters;
        let mut iter = 0;
        while iter < iters_needed {
            iter += 1;
            let sample = index::sample(&mut rng, n, SAMPLE_SIZE).into_vec();
            let s: Vec<[f64; 2]> = sample.iter().map(|&i| src[i]).collect();
            let d: Vec<[f64; 2]> = sample.iter().map(|&i| dst[i]).collect();
            if has_collinear_triple(&s) || has_collinear_triple(&d) {
                continue;
            }
            let Some(h) = fit_dlt(&s, &d) else {
                continue;
            };
            let (mask, count) = score(&h, &src[..n], &dst[..n], threshold_sq);
            if best.as_ref().map_or(true, |b| count > b.2) {
                iters_needed = adaptive_iterations(
                    count as f64 / n as f64,
                    self.cfg.confidence,
                    self.cfg.max_iters,
                );
                best = Some((h, mask, count));
            }
        }

        let Some((best_h, best_mask, best_count)) = best else {
            return Err(EstimateFailure::Degenerate);
        };
        if best_count < SAMPLE_SIZE {
            return Err(EstimateFailure::Degenerate);
        }

        let (inlier_src, inlier_dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = (0..n)
            .filter(|&i| best_mask[i])
            .map(|i| (src[i], dst[i]))
            .unzip();
        let (matrix, mask, count) = match fit_dlt(&inlier_src, &inlier_dst) {
            Some(refit) => {
                let (mask, count) = score(&refit, &src[..n], &dst[..n], threshold_sq);
                if count >= best_count {
                    (refit, mask, count)
                } else {
                    (best_h, best_mask, best_count)
                }
            }
            None => (best_h, best_mask, best_count),
        };

        if matrix.determinant().abs() < 1e-12 {
            return Err(EstimateFailure::Degenerate);
        }
        trace_event!("homography", iterations = iter, inliers = count);
        Ok(Homography::new(matrix, mask))
    }
}

fn score(
    h: &Matrix3<f64>,
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    threshold_sq: f64,
) -> (Vec<bool>, usize) {
    let mut count = 0;
    let mask = src
        .iter()
        .zip(dst)
        .map(|(s, d)| {
            let inlier = project_point(h, *s).is_some_and(|p| {
                let dx = p[0] - d[0];
                let dy = p[1] - d[1];
                dx * dx + dy * dy <= threshold_sq
            });
            count += inlier as usize;
            inlier
        })
        .collect();
    (mask, count)
}

fn has_collinear_triple(points: &[[f64; 2]]) -> bool {
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            for k in j + 1..points.len() {
                if cross2(points[i], points[j], points[k]).abs() < COLLINEAR_AREA {
                    return true;
                }
            }
        }
    }
    false
}

/// Iterations needed to draw an all-inlier sample with `confidence`.
fn adaptive_iterations(inlier_ratio: f64, confidence: f64, max_iters: usize) -> usize {
    let p_good = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::EPSILON {
        return max_iters;
    }
    let needed = ((1.0 - confidence).ln() / (1.0 - p_good).ln()).ceil();
    if needed.is_finite() && needed > 0.0 {
        (needed as usize).min(max_iters)
    } else {
        max_iters
    }
}
