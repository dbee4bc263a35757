//! Convenience helpers for loading and saving images via the `image` crate.

use crate::util::{AlignError, AlignResult};
use image::RgbImage;
use std::path::Path;

/// Loads an image from disk and converts it to 8-bit RGB.
pub fn load_color_image<P: AsRef<Path>>(path: P) -> AlignResult<RgbImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|err| AlignError::ImageIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    Ok(img.to_rgb8())
}

/// Writes an RGB image; the format follows the file extension.
pub fn save_color_image<P: AsRef<Path>>(path: P, img: &RgbImage) -> AlignResult<()> {
    let path = path.as_ref();
    img.save(path).map_err(|err| AlignError::ImageIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Reads only the header to obtain `(width, height)`.
pub fn image_dimensions<P: AsRef<Path>>(path: P) -> AlignResult<(u32, u32)> {
    let path = path.as_ref();
    image::image_dimensions(path).map_err(|err| AlignError::ImageIo {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}
