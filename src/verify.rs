//! Per-region similarity check between the template and an aligned image.
//!
//! Each region's normalized rectangle is cut from both grayscale images and
//! scored with ZNCC. An alignment is accepted only when every region reaches
//! `min_similarity`.

use crate::image::ImageView;
use crate::kernel::{Kernel, PatchPlan, ZnccScalar};
use crate::region::Region;
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{AlignError, AlignResult};
use image::GrayImage;
use rayon::prelude::*;

/// Configuration for region verification.
#[derive(Clone, Debug)]
pub struct VerifyConfig {
    /// Lowest acceptable per-region score.
    pub min_similarity: f32,
    /// Extra pixels around the aligned crop searched for the best placement.
    pub search_margin: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.40,
            search_margin: 0,
        }
    }
}

impl VerifyConfig {
    pub(crate) fn validate(&self) -> AlignResult<()> {
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(AlignError::InvalidConfig(format!(
                "min_similarity must be in [-1, 1], got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

/// Similarity of one region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionScore {
    pub region_id: String,
    pub score: f32,
}

/// Outcome of verifying all regions of one alignment.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// Every region reached the threshold.
    Accept,
    /// The lowest-scoring region fell below the threshold.
    LowSimilarity {
        region: String,
        score: f32,
        threshold: f32,
    },
}

/// Scores in region order plus the verdict.
#[derive(Clone, Debug, PartialEq)]
pub struct Verification {
    pub scores: Vec<RegionScore>,
    pub verdict: Verdict,
}

impl Verification {
    pub fn is_accepted(&self) -> bool {
        self.verdict == Verdict::Accept
    }
}

/// Scores regions of an aligned image against the template.
#[derive(Clone, Debug)]
pub struct RegionVerifier {
    cfg: VerifyConfig,
    parallel: bool,
}

impl RegionVerifier {
    pub fn new(cfg: VerifyConfig) -> AlignResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            parallel: false,
        })
    }

    /// Scores regions concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.cfg
    }

    /// Scores every region and applies the threshold.
    ///
    /// Fails with [`AlignError::RegionOutOfBounds`] naming the first region
    /// (in input order) that does not fit inside both images.
    pub fn verify(
        &self,
        template: &GrayImage,
        aligned: &GrayImage,
        regions: &[Region],
    ) -> AlignResult<Verification> {
        let _span = trace_span!("verify", regions = regions.len()).entered();

        let scored: Vec<AlignResult<RegionScore>> = if self.parallel {
            regions
                .par_iter()
                .map(|region| self.score_region(template, aligned, region))
                .collect()
        } else {
            regions
                .iter()
                .map(|region| self.score_region(template, aligned, region))
                .collect()
        };
        let scores = scored.into_iter().collect::<AlignResult<Vec<_>>>()?;

        let threshold = self.cfg.min_similarity;
        let worst = scores
            .iter()
            .filter(|s| s.score < threshold)
            .fold(None::<&RegionScore>, |acc, s| match acc {
                Some(best) if best.score <= s.score => Some(best),
                _ => Some(s),
            });
        let verdict = match worst {
            Some(s) => Verdict::LowSimilarity {
                region: s.region_id.clone(),
                score: s.score,
                threshold,
            },
            None => Verdict::Accept,
        };

        let accepted = verdict == Verdict::Accept;
        let min_score = scores.iter().map(|s| s.score).fold(f32::INFINITY, f32::min);
        trace_event!("verification", accepted = accepted, min_score = min_score);
        Ok(Verification { scores, verdict })
    }

    /// Best ZNCC score of one region.
    pub fn score_region(
        &self,
        template: &GrayImage,
        aligned: &GrayImage,
        region: &Region,
    ) -> AlignResult<RegionScore> {
        let (tw, th) = template.dimensions();
        let (aw, ah) = aligned.dimensions();
        let rect = region.bounded_rect(tw.min(aw), th.min(ah))?;

        let (x, y, w, h) = rect.to_pixels();
        let tpl_view =
            ImageView::from_gray(template)?.roi(x as usize, y as usize, w as usize, h as usize)?;
        let plan = PatchPlan::from_view(tpl_view)?;

        let search = rect.expand_clamped(self.cfg.search_margin, aw, ah);
        let (sx, sy, sw, sh) = search.to_pixels();
        let search_view =
            ImageView::from_gray(aligned)?.roi(sx as usize, sy as usize, sw as usize, sh as usize)?;
        let best = ZnccScalar::best_placement(search_view, &plan)?;

        trace_debug!("region_score", region = region.id(), score = best.score);
        Ok(RegionScore {
            region_id: region.id().to_string(),
            score: best.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RegionVerifier, Verdict, VerifyConfig};
    use crate::region::Region;
    use crate::util::AlignError;
    use image::{GrayImage, Luma};

    fn texture(width: u32, height: u32, shift: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let x = x + shift;
            Luma([((x * 37 + y * 91 + (x * y) % 17) % 251) as u8])
        })
    }

    #[test]
    fn identical_images_score_one() {
        let tpl = texture(120, 90, 0);
        let regions = vec![
            Region::new("a", "A", (10, 10), (50, 40)),
            Region::new("b", "B", (100, 80), (60, 20)),
        ];
        let verifier = RegionVerifier::new(VerifyConfig::default()).unwrap();
        let result = verifier.verify(&tpl, &tpl, &regions).unwrap();
        assert!(result.is_accepted());
        assert_eq!(result.scores.len(), 2);
        assert_eq!(result.scores[1].region_id, "b");
        assert!(result.scores.iter().all(|s| s.score > 0.999));
    }

    #[test]
    fn lowest_failing_region_is_named() {
        let tpl = texture(120, 90, 0);
        let mut aligned = tpl.clone();
        for y in 50..80 {
            for x in 60..110 {
                aligned.put_pixel(x, y, Luma([0]));
            }
        }
        let regions = vec![
            Region::new("ok", "Ok", (10, 10), (50, 40)),
            Region::new("blank", "Blank", (60, 50), (110, 80)),
        ];
        let verifier = RegionVerifier::new(VerifyConfig::default()).unwrap();
        let result = verifier.verify(&tpl, &aligned, &regions).unwrap();
        match result.verdict {
            Verdict::LowSimilarity { region, score, threshold } => {
                assert_eq!(region, "blank");
                assert_eq!(score, 0.0);
                assert_eq!(threshold, 0.40);
            }
            Verdict::Accept => panic!("blank region must fail"),
        }
    }

    #[test]
    fn search_margin_recovers_small_shift() {
        let tpl = texture(120, 90, 0);
        let shifted = texture(120, 90, 2);
        let region = vec![Region::new("a", "A", (30, 20), (70, 60))];
        let strict = RegionVerifier::new(VerifyConfig::default()).unwrap();
        let tolerant = RegionVerifier::new(VerifyConfig {
            search_margin: 3,
            ..VerifyConfig::default()
        })
        .unwrap();
        let exact = strict.verify(&tpl, &shifted, &region).unwrap().scores[0].score;
        let searched = tolerant.verify(&tpl, &shifted, &region).unwrap().scores[0].score;
        assert!(searched > 0.999);
        assert!(searched > exact);
    }

    #[test]
    fn region_outside_canvas_is_an_error() {
        let tpl = texture(60, 40, 0);
        let regions = vec![Region::new("far", "Far", (50, 10), (80, 30))];
        let verifier = RegionVerifier::new(VerifyConfig::default()).unwrap();
        assert!(matches!(
            verifier.verify(&tpl, &tpl, &regions),
            Err(AlignError::RegionOutOfBounds { region, .. }) if region == "far"
        ));
    }

    #[test]
    fn parallel_scores_match_sequential() {
        let tpl = texture(100, 80, 0);
        let aligned = texture(100, 80, 1);
        let regions: Vec<Region> = (0..6)
            .map(|i| Region::new(format!("r{i}"), "R", (i * 10, 5), (i * 10 + 30, 45)))
            .collect();
        let seq = RegionVerifier::new(VerifyConfig::default()).unwrap();
        let par = seq.clone().with_parallel(true);
        assert_eq!(
            seq.verify(&tpl, &aligned, &regions).unwrap(),
            par.verify(&tpl, &aligned, &regions).unwrap()
        );
    }
}
