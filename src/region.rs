//! Named rectangular regions of interest in template coordinates.
//!
//! A region is authored as two corner points in any order. [`Rect`] is the
//! normalized form: `left < right`, `top < bottom`, with `right` and `bottom`
//! exclusive, so `(100, 100)-(400, 300)` covers 300x200 pixels.

use crate::util::{AlignError, AlignResult};
use std::collections::HashSet;

/// Normalized axis-aligned rectangle; `right`/`bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Rect {
    /// Normalizes two opposite corners into a rectangle.
    pub fn from_corners(a: (i64, i64), b: (i64, i64)) -> Self {
        Self {
            left: a.0.min(b.0),
            top: a.1.min(b.1),
            right: a.0.max(b.0),
            bottom: a.1.max(b.1),
        }
    }

    /// Saturates at `i64::MAX` for corners at the ends of the `i64` range.
    pub fn width(&self) -> i64 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i64 {
        self.bottom.saturating_sub(self.top)
    }

    /// True when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// True when the rectangle lies fully inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left >= 0
            && self.top >= 0
            && self.right <= width as i64
            && self.bottom <= height as i64
    }

    /// Pixel coordinates `(x, y, width, height)` for an in-bounds rectangle.
    pub(crate) fn to_pixels(self) -> (u32, u32, u32, u32) {
        (
            self.left as u32,
            self.top as u32,
            self.width() as u32,
            self.height() as u32,
        )
    }

    /// Grows the rectangle by `margin` on every side, clamped to the image.
    pub(crate) fn expand_clamped(&self, margin: u32, width: u32, height: u32) -> Self {
        let m = margin as i64;
        Self {
            left: self.left.saturating_sub(m).max(0),
            top: self.top.saturating_sub(m).max(0),
            right: self.right.saturating_add(m).min(width as i64),
            bottom: self.bottom.saturating_add(m).min(height as i64),
        }
    }
}

/// A named rectangle plus the operator's pass/fail descriptions.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    id: String,
    name: String,
    corners: ((i64, i64), (i64, i64)),
    pass_description: String,
    fail_description: String,
}

impl Region {
    /// Creates a region from two corners given in any order.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        a: (i64, i64),
        b: (i64, i64),
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            corners: (a, b),
            pass_description: String::new(),
            fail_description: String::new(),
        }
    }

    /// Attaches the texts describing a passing and a failing region.
    pub fn with_descriptions(
        mut self,
        pass_description: impl Into<String>,
        fail_description: impl Into<String>,
    ) -> Self {
        self.pass_description = pass_description.into();
        self.fail_description = fail_description.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Corners as authored.
    pub fn corners(&self) -> ((i64, i64), (i64, i64)) {
        self.corners
    }

    pub fn pass_description(&self) -> &str {
        &self.pass_description
    }

    pub fn fail_description(&self) -> &str {
        &self.fail_description
    }

    /// Normalized rectangle.
    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.corners.0, self.corners.1)
    }

    /// Returns the normalized rectangle if it is non-empty and fits inside
    /// a `width` x `height` canvas.
    pub fn bounded_rect(&self, width: u32, height: u32) -> AlignResult<Rect> {
        let rect = self.rect();
        if rect.is_empty() {
            return Err(AlignError::EmptyRegion {
                region: self.id.clone(),
            });
        }
        if !rect.fits_within(width, height) {
            return Err(AlignError::RegionOutOfBounds {
                region: self.id.clone(),
                left: rect.left,
                top: rect.top,
                right: rect.right,
                bottom: rect.bottom,
                img_width: width,
                img_height: height,
            });
        }
        Ok(rect)
    }
}

/// Checks a model's region set against the template size.
///
/// Fails on the first empty, out-of-bounds or duplicate-id region in input
/// order.
pub fn validate_regions(regions: &[Region], width: u32, height: u32) -> AlignResult<()> {
    let mut seen = HashSet::with_capacity(regions.len());
    for region in regions {
        region.bounded_rect(width, height)?;
        if !seen.insert(region.id()) {
            return Err(AlignError::DuplicateRegion(region.id().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_regions, Rect, Region};
    use crate::util::AlignError;

    #[test]
    fn corners_in_any_order_normalize() {
        let expected = Rect {
            left: 100,
            top: 100,
            right: 400,
            bottom: 300,
        };
        for (a, b) in [
            ((100, 100), (400, 300)),
            ((400, 300), (100, 100)),
            ((400, 100), (100, 300)),
            ((100, 300), (400, 100)),
        ] {
            assert_eq!(Rect::from_corners(a, b), expected);
        }
        assert_eq!((expected.width(), expected.height()), (300, 200));
    }

    #[test]
    fn region_outside_template_is_reported_by_id() {
        let region = Region::new("r1", "Label", (1300, 100), (1500, 300));
        match region.bounded_rect(1200, 900) {
            Err(AlignError::RegionOutOfBounds { region, .. }) => assert_eq!(region, "r1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extreme_corners_saturate_instead_of_overflowing() {
        let region = Region::new("wide", "Wide", (i64::MIN, i64::MIN), (i64::MAX, i64::MAX));
        let rect = region.rect();
        assert_eq!((rect.width(), rect.height()), (i64::MAX, i64::MAX));
        assert!(!rect.is_empty());
        assert!(matches!(
            region.bounded_rect(1200, 900),
            Err(AlignError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn degenerate_region_is_empty() {
        let region = Region::new("flat", "Flat", (10, 10), (10, 50));
        assert!(matches!(
            region.bounded_rect(100, 100),
            Err(AlignError::EmptyRegion { .. })
        ));
    }

    #[test]
    fn rect_touching_edges_fits() {
        let region = Region::new("edge", "Edge", (0, 0), (1200, 900));
        assert!(region.bounded_rect(1200, 900).is_ok());
        assert!(region.bounded_rect(1199, 900).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let regions = vec![
            Region::new("a", "A", (0, 0), (10, 10)),
            Region::new("a", "A again", (20, 20), (30, 30)),
        ];
        assert_eq!(
            validate_regions(&regions, 100, 100),
            Err(AlignError::DuplicateRegion("a".into()))
        );
    }

    #[test]
    fn expand_clamps_to_canvas() {
        let rect = Rect::from_corners((2, 3), (10, 10));
        let grown = rect.expand_clamped(4, 12, 40);
        assert_eq!(
            grown,
            Rect {
                left: 0,
                top: 0,
                right: 12,
                bottom: 14
            }
        );
    }
}
