//! Scale pyramid construction for grayscale images.
//!
//! Level `i` is the base image resampled by `1 / scale_factor^i` directly
//! from the base (triangle filter, so downscaling averages over the source
//! footprint), then smoothed with a Gaussian. Resampling every level from
//! the base keeps rounding errors from accumulating across levels.

use crate::util::{AlignError, AlignResult};
use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

/// One resampled, smoothed pyramid level.
pub struct PyramidLevel {
    image: GrayImage,
    scale: f32,
}

impl PyramidLevel {
    /// Returns the smoothed level image.
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Returns the factor mapping level pixels to base pixels.
    pub fn scale(&self) -> f32 {
        self.scale
    }
}

/// Owned scale pyramid built from a base level.
pub struct ScalePyramid {
    levels: Vec<PyramidLevel>,
}

impl ScalePyramid {
    /// Builds a pyramid from a base grayscale image.
    ///
    /// `max_levels` is clamped to at least 1 so the base level is always
    /// present. Construction stops early once a level would have a side
    /// shorter than `min_side`.
    pub fn build(
        base: &GrayImage,
        max_levels: usize,
        scale_factor: f32,
        blur_sigma: f32,
        min_side: u32,
    ) -> AlignResult<Self> {
        let (width, height) = base.dimensions();
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidDimensions {
                width: width as usize,
                height: height as usize,
            });
        }
        if !scale_factor.is_finite() || scale_factor <= 1.0 {
            return Err(AlignError::InvalidConfig(format!(
                "pyramid scale factor must be > 1, got {scale_factor}"
            )));
        }

        let smooth = |img: GrayImage| {
            if blur_sigma > 0.0 {
                gaussian_blur_f32(&img, blur_sigma)
            } else {
                img
            }
        };

        let mut levels = Vec::with_capacity(max_levels.max(1));
        levels.push(PyramidLevel {
            image: smooth(base.clone()),
            scale: 1.0,
        });

        for index in 1..max_levels.max(1) {
            let scale = scale_factor.powi(index as i32);
            let level_width = (width as f32 / scale).round() as u32;
            let level_height = (height as f32 / scale).round() as u32;
            if level_width < min_side || level_height < min_side {
                break;
            }
            let resized = imageops::resize(base, level_width, level_height, FilterType::Triangle);
            // Effective scale per axis differs slightly after rounding; the
            // mean keeps keypoint back-projection unbiased.
            let effective =
                0.5 * (width as f32 / level_width as f32 + height as f32 / level_height as f32);
            levels.push(PyramidLevel {
                image: smooth(resized),
                scale: effective,
            });
        }

        Ok(Self { levels })
    }

    /// Returns all pyramid levels (level 0 is the base resolution).
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    /// Returns a specific pyramid level.
    pub fn level(&self, index: usize) -> Option<&PyramidLevel> {
        self.levels.get(index)
    }

    /// Returns the number of levels actually built.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns true when no level was built.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::ScalePyramid;
    use image::GrayImage;

    #[test]
    fn pyramid_stops_at_min_side() {
        let base = GrayImage::from_fn(128, 96, |x, y| image::Luma([((x * 7 + y * 3) % 255) as u8]));
        let pyramid = ScalePyramid::build(&base, 10, 2.0, 0.0, 20).unwrap();
        let sizes: Vec<_> = pyramid
            .levels()
            .iter()
            .map(|level| level.image().dimensions())
            .collect();
        assert_eq!(sizes, vec![(128, 96), (64, 48), (32, 24)]);
        assert!((pyramid.level(2).unwrap().scale() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn pyramid_rejects_non_shrinking_factor() {
        let base = GrayImage::new(16, 16);
        assert!(ScalePyramid::build(&base, 3, 1.0, 1.0, 4).is_err());
    }
}
