//! Image views, scale pyramids and file I/O.
//!
//! Color originals are carried as `image::RgbImage` and grayscale
//! derivatives as `image::GrayImage`. `ImageView` is a borrowed 2D view into
//! a 1D buffer with an explicit stride, used by the correlation kernel so
//! region crops can be scored without copying. The stride counts elements
//! between the starts of consecutive rows; ROI slices keep the parent stride.

use crate::util::{AlignError, AlignResult};
use image::{GrayImage, RgbImage};

pub mod io;
pub mod pyramid;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> AlignResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> AlignResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(AlignError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(&self, x: usize, y: usize, width: usize, height: usize) -> AlignResult<Self> {
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidDimensions { width, height });
        }

        let out_of_bounds = AlignError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or_else(|| out_of_bounds.clone())?;
        let end_y = y.checked_add(height).ok_or_else(|| out_of_bounds.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(out_of_bounds);
        }

        let start = y
            .checked_mul(self.stride)
            .and_then(|v| v.checked_add(x))
            .ok_or(AlignError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })?;
        let data = self.data.get(start..).ok_or(AlignError::BufferTooSmall {
            needed: start.saturating_add(1),
            got: self.data.len(),
        })?;

        ImageView::new(data, width, height, self.stride)
    }
}

impl<'a> ImageView<'a, u8> {
    /// Creates a borrowed view over a grayscale image buffer.
    pub fn from_gray(img: &'a GrayImage) -> AlignResult<Self> {
        Self::from_slice(img.as_raw(), img.width() as usize, img.height() as usize)
    }

    /// Samples the view at a fractional position with bilinear interpolation.
    ///
    /// Returns `None` when `(x, y)` falls outside `[0, w-1] x [0, h-1]`.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> Option<f32> {
        let max_x = self.width as f32 - 1.0;
        let max_y = self.height as f32 - 1.0;
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 || x > max_x || y > max_y {
            return None;
        }
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let row0 = self.row(y0)?;
        let row1 = self.row(y1)?;
        let top = row0[x0] as f32 * (1.0 - fx) + row0[x1] as f32 * fx;
        let bottom = row1[x0] as f32 * (1.0 - fx) + row1[x1] as f32 * fx;
        Some(top * (1.0 - fy) + bottom * fy)
    }
}

/// Converts a color image to its grayscale derivative.
pub fn to_gray(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

fn required_len(width: usize, height: usize, stride: usize) -> AlignResult<usize> {
    if width == 0 || height == 0 {
        return Err(AlignError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(AlignError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(AlignError::InvalidDimensions { width, height })
}
