//! Orientation assignment and gradient-histogram descriptors.

use crate::candidate::topk::Peak;
use crate::features::Keypoint;
use crate::image::ImageView;
use crate::util::math::{quad_peak_offset_1d, wrap_rad};
use std::f32::consts::TAU;

/// Number of elements in one descriptor.
pub const DESCRIPTOR_LEN: usize = CELLS * CELLS * ORI_BINS;

/// Half-width of the descriptor window in level pixels.
pub const DESCRIPTOR_RADIUS: f32 = GRID as f32 * 0.5 * SAMPLE_STEP;

/// Corners closer than this to a level border are not described.
pub(crate) const BORDER_MARGIN: usize = 17;

const ORIENT_RADIUS: i32 = 8;
const ORIENT_SIGMA: f32 = 4.0;
const ORIENT_BINS: usize = 36;

const GRID: usize = 16;
const CELLS: usize = 4;
const ORI_BINS: usize = 8;
const SAMPLE_STEP: f32 = 1.25;
const CLIP: f32 = 0.2;

/// Computes the keypoint and descriptor for a level-space corner.
///
/// Returns `None` for corners without a usable gradient (flat patches).
pub(crate) fn describe(
    view: ImageView<'_, u8>,
    peak: &Peak,
    scale: f32,
) -> Option<(Keypoint, Vec<f32>)> {
    let x = peak.x as f32;
    let y = peak.y as f32;
    let angle = dominant_orientation(view, peak.x as i32, peak.y as i32)?;
    let descriptor = descriptor_at(view, x, y, angle)?;
    let keypoint = Keypoint {
        x: (x + 0.5) * scale - 0.5,
        y: (y + 0.5) * scale - 0.5,
        size: 2.0 * DESCRIPTOR_RADIUS * scale,
        angle,
        response: peak.score,
        octave: peak.level,
    };
    Some((keypoint, descriptor))
}

fn pixel(view: ImageView<'_, u8>, x: i32, y: i32) -> Option<f32> {
    if x < 0 || y < 0 {
        return None;
    }
    view.get(x as usize, y as usize).map(|&v| v as f32)
}

/// Peak of a Gaussian-weighted gradient orientation histogram.
fn dominant_orientation(view: ImageView<'_, u8>, cx: i32, cy: i32) -> Option<f32> {
    let mut hist = [0.0f32; ORIENT_BINS];
    let inv_two_sigma_sq = 1.0 / (2.0 * ORIENT_SIGMA * ORIENT_SIGMA);
    let radius_sq = ORIENT_RADIUS * ORIENT_RADIUS;

    for dy in -ORIENT_RADIUS..=ORIENT_RADIUS {
        for dx in -ORIENT_RADIUS..=ORIENT_RADIUS {
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > radius_sq {
                continue;
            }
            let px = cx + dx;
            let py = cy + dy;
            let gx = pixel(view, px + 1, py)? - pixel(view, px - 1, py)?;
            let gy = pixel(view, px, py + 1)? - pixel(view, px, py - 1)?;
            let mag = (gx * gx + gy * gy).sqrt();
            if mag <= 0.0 {
                continue;
            }
            let theta = wrap_rad(gy.atan2(gx));
            let bin = ((theta / TAU) * ORIENT_BINS as f32) as usize % ORIENT_BINS;
            hist[bin] += mag * (-(dist_sq as f32) * inv_two_sigma_sq).exp();
        }
    }

    for _ in 0..2 {
        let prev = hist;
        for (bin, value) in hist.iter_mut().enumerate() {
            let left = prev[(bin + ORIENT_BINS - 1) % ORIENT_BINS];
            let right = prev[(bin + 1) % ORIENT_BINS];
            *value = 0.25 * left + 0.5 * prev[bin] + 0.25 * right;
        }
    }

    let mut best = 0usize;
    for bin in 1..ORIENT_BINS {
        if hist[bin] > hist[best] {
            best = bin;
        }
    }
    if hist[best] <= 1e-6 {
        return None;
    }

    let left = hist[(best + ORIENT_BINS - 1) % ORIENT_BINS];
    let right = hist[(best + 1) % ORIENT_BINS];
    let offset = quad_peak_offset_1d(left, hist[best], right).unwrap_or(0.0);
    Some(wrap_rad(
        (best as f32 + 0.5 + offset) * TAU / ORIENT_BINS as f32,
    ))
}

/// 4x4x8 histogram of gradients sampled on a grid rotated by `angle`.
fn descriptor_at(view: ImageView<'_, u8>, x: f32, y: f32, angle: f32) -> Option<Vec<f32>> {
    let (sin_a, cos_a) = angle.sin_cos();
    let mut hist = vec![0.0f32; DESCRIPTOR_LEN];
    let inv_two_sigma_sq = 1.0 / (2.0 * DESCRIPTOR_RADIUS * DESCRIPTOR_RADIUS);
    let half = (GRID as f32 - 1.0) * 0.5;
    let cell_span = (GRID / CELLS) as f32;

    for i in 0..GRID {
        for j in 0..GRID {
            let u = (j as f32 - half) * SAMPLE_STEP;
            let v = (i as f32 - half) * SAMPLE_STEP;
            let sx = x + u * cos_a - v * sin_a;
            let sy = y + u * sin_a + v * cos_a;

            let gx = view.sample_bilinear(sx + 1.0, sy)? - view.sample_bilinear(sx - 1.0, sy)?;
            let gy = view.sample_bilinear(sx, sy + 1.0)? - view.sample_bilinear(sx, sy - 1.0)?;
            let mag = (gx * gx + gy * gy).sqrt();
            if mag <= 0.0 {
                continue;
            }
            let rel = wrap_rad(gy.atan2(gx) - angle);
            let weighted = mag * (-(u * u + v * v) * inv_two_sigma_sq).exp();

            let rbin = (i as f32 + 0.5) / cell_span - 0.5;
            let cbin = (j as f32 + 0.5) / cell_span - 0.5;
            let obin = rel / TAU * ORI_BINS as f32;
            let r0 = rbin.floor();
            let c0 = cbin.floor();
            let o0 = obin.floor();
            let (dr, dc, dori) = (rbin - r0, cbin - c0, obin - o0);

            for (ri, wr) in [(r0 as i32, 1.0 - dr), (r0 as i32 + 1, dr)] {
                if ri < 0 || ri >= CELLS as i32 {
                    continue;
                }
                for (ci, wc) in [(c0 as i32, 1.0 - dc), (c0 as i32 + 1, dc)] {
                    if ci < 0 || ci >= CELLS as i32 {
                        continue;
                    }
                    for (oi, wo) in [(o0 as i32, 1.0 - dori), (o0 as i32 + 1, dori)] {
                        let oi = oi.rem_euclid(ORI_BINS as i32) as usize;
                        let idx = (ri as usize * CELLS + ci as usize) * ORI_BINS + oi;
                        hist[idx] += weighted * wr * wc * wo;
                    }
                }
            }
        }
    }

    normalize(&mut hist)?;
    for value in hist.iter_mut() {
        *value = value.min(CLIP);
    }
    normalize(&mut hist)?;
    Some(hist)
}

fn normalize(values: &mut [f32]) -> Option<()> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= 1e-12 || !norm.is_finite() {
        return None;
    }
    let inv = 1.0 / norm;
    for value in values.iter_mut() {
        *value *= inv;
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::{dominant_orientation, BORDER_MARGIN, DESCRIPTOR_RADIUS};
    use crate::image::ImageView;
    use std::f32::consts::PI;

    #[test]
    fn border_margin_covers_rotated_window() {
        let reach = DESCRIPTOR_RADIUS * std::f32::consts::SQRT_2 + 2.0;
        assert!((BORDER_MARGIN as f32) > reach);
    }

    #[test]
    fn orientation_follows_horizontal_ramp() {
        let width = 40;
        let data: Vec<u8> = (0..width * width).map(|i| ((i % width) * 4) as u8).collect();
        let view = ImageView::from_slice(&data, width, width).unwrap();
        let angle = dominant_orientation(view, 20, 20).unwrap();
        let diff = angle.min(2.0 * PI - angle);
        assert!(diff < 0.2, "expected angle near 0, got {angle}");
    }

    #[test]
    fn flat_patch_has_no_orientation() {
        let data = vec![90u8; 40 * 40];
        let view = ImageView::from_slice(&data, 40, 40).unwrap();
        assert!(dominant_orientation(view, 20, 20).is_none());
    }
}
