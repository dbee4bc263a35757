//! Non-maximum suppression for corner responses.

use crate::candidate::topk::Peak;

/// Keeps peaks that dominate their 8-neighborhood on the response map.
///
/// A peak survives when no neighbor scores higher; among equal neighbors the
/// one earliest in raster order wins, so exactly one of a plateau pair is
/// kept. `width`/`height` are the level dimensions.
pub(crate) fn nms_3x3(peaks: &[Peak], width: usize, height: usize) -> Vec<Peak> {
    if peaks.is_empty() || width == 0 || height == 0 {
        return Vec::new();
    }

    let mut response = vec![f32::NEG_INFINITY; width * height];
    for peak in peaks {
        if peak.x < width && peak.y < height {
            response[peak.y * width + peak.x] = peak.score;
        }
    }

    let mut kept = Vec::with_capacity(peaks.len() / 2);
    'outer: for peak in peaks.iter().copied() {
        if peak.x >= width || peak.y >= height {
            continue;
        }
        let y0 = peak.y.saturating_sub(1);
        let y1 = (peak.y + 1).min(height - 1);
        let x0 = peak.x.saturating_sub(1);
        let x1 = (peak.x + 1).min(width - 1);
        for ny in y0..=y1 {
            for nx in x0..=x1 {
                if nx == peak.x && ny == peak.y {
                    continue;
                }
                let other = response[ny * width + nx];
                let earlier = (ny, nx) < (peak.y, peak.x);
                if other > peak.score || (other == peak.score && earlier) {
                    continue 'outer;
                }
            }
        }
        kept.push(peak);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::nms_3x3;
    use crate::candidate::topk::Peak;

    fn peak(x: usize, y: usize, score: f32) -> Peak {
        Peak {
            x,
            y,
            score,
            level: 0,
        }
    }

    #[test]
    fn nms_keeps_local_maxima_only() {
        let peaks = vec![peak(2, 2, 5.0), peak(3, 2, 4.0), peak(6, 6, 1.0)];
        let kept = nms_3x3(&peaks, 10, 10);
        assert_eq!(kept, vec![peak(2, 2, 5.0), peak(6, 6, 1.0)]);
    }

    #[test]
    fn nms_plateau_keeps_single_peak() {
        let peaks = vec![peak(4, 4, 2.0), peak(5, 4, 2.0)];
        let kept = nms_3x3(&peaks, 10, 10);
        assert_eq!(kept, vec![peak(4, 4, 2.0)]);
    }
}
