//! Strongest-N retention for corner peaks.

use std::cmp::Ordering;

/// Corner candidate on a specific pyramid level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    /// X coordinate (column) in level pixels.
    pub x: usize,
    /// Y coordinate (row) in level pixels.
    pub y: usize,
    /// Detector response at the peak.
    pub score: f32,
    /// Pyramid level the peak was detected on.
    pub level: usize,
}

/// Orders peaks by descending score with deterministic tie-breaking.
pub(crate) fn peak_cmp_desc(a: &Peak, b: &Peak) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.level.cmp(&b.level))
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.x.cmp(&b.x))
}

/// Sorts peaks by descending score with deterministic tie-breaking.
pub(crate) fn sort_peaks_desc(peaks: &mut [Peak]) {
    peaks.sort_by(peak_cmp_desc);
}

/// Keeps the `cap` strongest peaks, sorted by descending score.
pub(crate) fn retain_strongest(peaks: &mut Vec<Peak>, cap: usize) {
    if cap == 0 {
        peaks.clear();
        return;
    }
    if peaks.len() > cap {
        peaks.select_nth_unstable_by(cap - 1, peak_cmp_desc);
        peaks.truncate(cap);
    }
    sort_peaks_desc(peaks);
}

#[cfg(test)]
mod tests {
    use super::{retain_strongest, Peak};

    fn peak(x: usize, score: f32) -> Peak {
        Peak {
            x,
            y: 0,
            score,
            level: 0,
        }
    }

    #[test]
    fn retain_strongest_keeps_top_scores_in_order() {
        let mut peaks = vec![peak(0, 1.0), peak(1, 5.0), peak(2, 3.0), peak(3, 4.0)];
        retain_strongest(&mut peaks, 2);
        let xs: Vec<_> = peaks.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1, 3]);
    }

    #[test]
    fn retain_strongest_breaks_ties_by_position() {
        let mut peaks = vec![peak(9, 2.0), peak(4, 2.0), peak(7, 2.0)];
        retain_strongest(&mut peaks, 2);
        let xs: Vec<_> = peaks.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![4, 7]);
    }

    #[test]
    fn retain_strongest_zero_cap_clears() {
        let mut peaks = vec![peak(0, 1.0)];
        retain_strongest(&mut peaks, 0);
        assert!(peaks.is_empty());
    }
}
