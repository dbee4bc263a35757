//! Scale- and rotation-invariant keypoints with gradient-histogram descriptors.
//!
//! Detection runs FAST-9 on every level of a [`ScalePyramid`], suppresses
//! non-maxima per level and caps the total count by response. Each surviving
//! corner gets a dominant gradient orientation and a 128-element descriptor
//! (4x4 cells of 8 orientation bins) sampled on a grid rotated to that
//! orientation. Keypoint positions are reported in base-image pixels.
//!
//! Extraction is deterministic: identical pixels give identical output.

mod describe;

use crate::candidate::nms::nms_3x3;
use crate::candidate::topk::{retain_strongest, Peak};
use crate::image::pyramid::{PyramidLevel, ScalePyramid};
use crate::image::ImageView;
use crate::trace::{trace_event, trace_span};
use crate::util::{AlignError, AlignResult};
use image::GrayImage;
use imageproc::corners::corners_fast9;
use rayon::prelude::*;

pub use describe::{DESCRIPTOR_LEN, DESCRIPTOR_RADIUS};

/// Keypoint location and shape metadata in base-image pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// X coordinate (column) in base-image pixels.
    pub x: f32,
    /// Y coordinate (row) in base-image pixels.
    pub y: f32,
    /// Descriptor window diameter in base-image pixels.
    pub size: f32,
    /// Dominant orientation in radians, `[0, 2π)`.
    pub angle: f32,
    /// Detector response.
    pub response: f32,
    /// Pyramid level the keypoint was detected on.
    pub octave: usize,
}

/// Index-aligned keypoints and descriptors.
#[derive(Clone, Debug, Default)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<f32>,
}

impl FeatureSet {
    /// Creates a feature set from keypoints and a flat descriptor buffer.
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<f32>) -> AlignResult<Self> {
        if descriptors.len() != keypoints.len() * DESCRIPTOR_LEN {
            return Err(AlignError::BufferTooSmall {
                needed: keypoints.len() * DESCRIPTOR_LEN,
                got: descriptors.len(),
            });
        }
        Ok(Self {
            keypoints,
            descriptors,
        })
    }

    /// Returns the number of features.
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Returns true when no features were found.
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Returns the keypoints in extraction order.
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Returns the descriptor for feature `index`.
    pub fn descriptor(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(DESCRIPTOR_LEN)?;
        self.descriptors.get(start..start + DESCRIPTOR_LEN)
    }

    /// Returns all descriptors as one row-major buffer.
    pub fn descriptors(&self) -> &[f32] {
        &self.descriptors
    }
}

/// Configuration for feature extraction.
#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    /// Upper bound on returned keypoints; the strongest responses are kept.
    pub max_features: usize,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Maximum pyramid levels.
    pub pyramid_levels: usize,
    /// Downscale factor between consecutive levels.
    pub scale_factor: f32,
    /// Gaussian sigma applied to every level before detection.
    pub blur_sigma: f32,
    /// Smallest level side length worth searching.
    pub min_level_side: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_features: 50_000,
            fast_threshold: 20,
            pyramid_levels: 6,
            scale_factor: std::f32::consts::SQRT_2,
            blur_sigma: 1.0,
            min_level_side: 32,
        }
    }
}

impl ExtractorConfig {
    pub(crate) fn validate(&self) -> AlignResult<()> {
        if self.pyramid_levels == 0 {
            return Err(AlignError::InvalidConfig(
                "pyramid_levels must be at least 1".into(),
            ));
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(AlignError::InvalidConfig(format!(
                "scale_factor must be > 1, got {}",
                self.scale_factor
            )));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(AlignError::InvalidConfig(format!(
                "blur_sigma must be >= 0, got {}",
                self.blur_sigma
            )));
        }
        Ok(())
    }
}

/// Detects keypoints and computes descriptors on grayscale images.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    cfg: ExtractorConfig,
    parallel: bool,
}

impl FeatureExtractor {
    /// Creates an extractor after validating the configuration.
    pub fn new(cfg: ExtractorConfig) -> AlignResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            parallel: false,
        })
    }

    /// Enables rayon parallelism across pyramid levels and keypoints.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ExtractorConfig {
        &self.cfg
    }

    /// Extracts keypoints and descriptors from a grayscale image.
    ///
    /// Returns an empty set when the image has no stable corners (blank or
    /// low-texture input); this is not an error.
    pub fn extract(&self, gray: &GrayImage) -> AlignResult<FeatureSet> {
        let _span = trace_span!("extract", width = gray.width(), height = gray.height()).entered();

        let pyramid = ScalePyramid::build(
            gray,
            self.cfg.pyramid_levels,
            self.cfg.scale_factor,
            self.cfg.blur_sigma,
            self.cfg.min_level_side,
        )?;

        let detect = |(level, lvl): (usize, &PyramidLevel)| {
            detect_level(lvl.image(), level, self.cfg.fast_threshold)
        };
        let per_level: Vec<Vec<Peak>> = if self.parallel {
            pyramid.levels().par_iter().enumerate().map(detect).collect()
        } else {
            pyramid.levels().iter().enumerate().map(detect).collect()
        };

        let mut peaks: Vec<Peak> = per_level.into_iter().flatten().collect();
        let detected = peaks.len();
        retain_strongest(&mut peaks, self.cfg.max_features);

        let views = pyramid
            .levels()
            .iter()
            .map(|level| ImageView::from_gray(level.image()))
            .collect::<AlignResult<Vec<_>>>()?;

        let describe_one = |peak: &Peak| -> Option<(Keypoint, Vec<f32>)> {
            let level = pyramid.level(peak.level)?;
            let view = views[peak.level];
            describe::describe(view, peak, level.scale())
        };
        let described: Vec<Option<(Keypoint, Vec<f32>)>> = if self.parallel {
            peaks.par_iter().map(describe_one).collect()
        } else {
            peaks.iter().map(describe_one).collect()
        };

        let mut keypoints = Vec::with_capacity(described.len());
        let mut descriptors = Vec::with_capacity(described.len() * DESCRIPTOR_LEN);
        for (keypoint, descriptor) in described.into_iter().flatten() {
            keypoints.push(keypoint);
            descriptors.extend_from_slice(&descriptor);
        }

        trace_event!(
            "features",
            levels = pyramid.len(),
            detected = detected,
            kept = keypoints.len()
        );
        FeatureSet::new(keypoints, descriptors)
    }
}

/// FAST-9 corners on one level, border-filtered and non-maximum suppressed.
fn detect_level(image: &GrayImage, level: usize, threshold: u8) -> Vec<Peak> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let margin = describe::BORDER_MARGIN;
    if width <= 2 * margin || height <= 2 * margin {
        return Vec::new();
    }

    let peaks: Vec<Peak> = corners_fast9(image, threshold)
        .into_iter()
        .map(|corner| Peak {
            x: corner.x as usize,
            y: corner.y as usize,
            score: corner.score,
            level,
        })
        .filter(|peak| {
            peak.x >= margin
                && peak.y >= margin
                && peak.x < width - margin
                && peak.y < height - margin
        })
        .collect();

    nms_3x3(&peaks, width, height)
}

#[cfg(test)]
mod tests {
    use super::{ExtractorConfig, FeatureExtractor, DESCRIPTOR_LEN};
    use image::{GrayImage, Luma};

    /// Bright blocks of varying size on a dark background.
    fn blocks(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let cx = x / 40;
            let cy = y / 40;
            let side = 12 + (cx * 7 + cy * 5) % 18;
            let inside = x % 40 >= 6 && x % 40 < 6 + side && y % 40 >= 8 && y % 40 < 8 + side;
            Luma([if inside { 200 + ((cx + cy) % 4) as u8 * 10 } else { 25 }])
        })
    }

    #[test]
    fn blank_image_yields_empty_set() {
        let extractor = FeatureExtractor::new(ExtractorConfig::default()).unwrap();
        let features = extractor.extract(&GrayImage::new(200, 150)).unwrap();
        assert!(features.is_empty());
        assert!(features.descriptors().is_empty());
    }

    #[test]
    fn descriptors_are_index_aligned_and_normalized() {
        let extractor = FeatureExtractor::new(ExtractorConfig::default()).unwrap();
        let features = extractor.extract(&blocks(200, 160)).unwrap();
        assert!(!features.is_empty());
        assert_eq!(features.descriptors().len(), features.len() * DESCRIPTOR_LEN);
        let d = features.descriptor(0).unwrap();
        let norm: f32 = d.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn cap_limits_feature_count() {
        let cfg = ExtractorConfig {
            max_features: 5,
            ..ExtractorConfig::default()
        };
        let extractor = FeatureExtractor::new(cfg).unwrap();
        let features = extractor.extract(&blocks(200, 160)).unwrap();
        assert!(features.len() <= 5);
    }

    #[test]
    fn invalid_scale_factor_is_rejected() {
        let cfg = ExtractorConfig {
            scale_factor: 0.5,
            ..ExtractorConfig::default()
        };
        assert!(FeatureExtractor::new(cfg).is_err());
    }
}
