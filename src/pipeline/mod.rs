//! One-shot alignment of candidate images against a model template.
//!
//! The pipeline is built once per model: the template's grayscale image and
//! features are computed up front and every [`AlignmentPipeline::align`]
//! call reuses them. A run goes through extraction, matching, estimation,
//! warping and verification; expected per-image failures become
//! [`AlignmentOutcome::Rejected`] values, only programming or configuration
//! errors surface as `Err`.

pub mod batch;
pub mod outcome;

use crate::crop::{CroppedArtifact, RegionCropper};
use crate::features::{ExtractorConfig, FeatureExtractor, FeatureSet};
use crate::homography::{EstimateFailure, HomographyEstimator, RansacConfig};
use crate::image::{io, to_gray};
use crate::matching::{CorrespondenceMatcher, MatcherConfig};
use crate::region::{validate_regions, Region};
use crate::trace::{trace_event, trace_span};
use crate::util::{AlignError, AlignResult};
use crate::verify::{RegionVerifier, Verdict, VerifyConfig};
use crate::warp::ImageAligner;
use image::{GrayImage, RgbImage};
use std::path::Path;
use std::sync::Arc;

pub use outcome::{Alignment, AlignmentOutcome, RejectReason, Rejection, RunStage};

/// Configuration for every pipeline stage.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub extractor: ExtractorConfig,
    pub matcher: MatcherConfig,
    pub ransac: RansacConfig,
    pub verify: VerifyConfig,
    /// Use rayon inside a single run (levels, queries, rows, regions).
    pub parallel: bool,
}

/// Template-bound alignment pipeline.
pub struct AlignmentPipeline {
    template: Arc<RgbImage>,
    template_gray: GrayImage,
    template_features: FeatureSet,
    regions: Vec<Region>,
    extractor: FeatureExtractor,
    matcher: CorrespondenceMatcher,
    estimator: HomographyEstimator,
    aligner: ImageAligner,
    verifier: RegionVerifier,
}

impl AlignmentPipeline {
    /// Prepares a pipeline for `template` and its `regions`.
    ///
    /// Fails on invalid configuration and on regions that are empty,
    /// duplicated or do not fit inside the template.
    pub fn new(template: RgbImage, regions: Vec<Region>, cfg: PipelineConfig) -> AlignResult<Self> {
        let (width, height) = template.dimensions();
        if width == 0 || height == 0 {
            return Err(AlignError::InvalidDimensions {
                width: width as usize,
                height: height as usize,
            });
        }
        validate_regions(&regions, width, height)?;

        let extractor = FeatureExtractor::new(cfg.extractor)?.with_parallel(cfg.parallel);
        let matcher = CorrespondenceMatcher::new(cfg.matcher)?.with_parallel(cfg.parallel);
        let estimator = HomographyEstimator::new(cfg.ransac)?;
        let aligner = ImageAligner::new();
        let verifier = RegionVerifier::new(cfg.verify)?.with_parallel(cfg.parallel);

        let template_gray = to_gray(&template);
        let template_features = extractor.extract(&template_gray)?;
        trace_event!(
            "template_ready",
            width = width,
            height = height,
            keypoints = template_features.len(),
            regions = regions.len()
        );

        Ok(Self {
            template: Arc::new(template),
            template_gray,
            template_features,
            regions,
            extractor,
            matcher,
            estimator,
            aligner,
            verifier,
        })
    }

    /// Loads the template from disk, then behaves like [`Self::new`].
    pub fn from_path(
        template: impl AsRef<Path>,
        regions: Vec<Region>,
        cfg: PipelineConfig,
    ) -> AlignResult<Self> {
        Self::new(io::load_color_image(template)?, regions, cfg)
    }

    pub fn template(&self) -> &RgbImage {
        &self.template
    }

    pub fn template_features(&self) -> &FeatureSet {
        &self.template_features
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Aligns one in-memory candidate.
    pub fn align(&self, candidate_id: &str, candidate: &RgbImage) -> AlignResult<AlignmentOutcome> {
        let _span = trace_span!("align", candidate = candidate_id).entered();
        let outcome = self.run(candidate_id, candidate)?;
        match &outcome {
            AlignmentOutcome::Succeeded(a) => {
                trace_event!("aligned", inliers = a.homography.inlier_count());
            }
            AlignmentOutcome::Rejected(r) => {
                trace_event!("rejected", stage = r.stage.as_str(), reason = r.reason.kind());
            }
        }
        Ok(outcome)
    }

    /// Loads and aligns a candidate file; an unreadable file is a rejection.
    pub fn align_path(&self, path: impl AsRef<Path>) -> AlignResult<AlignmentOutcome> {
        let path = path.as_ref();
        let candidate_id = path.display().to_string();
        match io::load_color_image(path) {
            Ok(image) => self.align(&candidate_id, &image),
            Err(err) => Ok(AlignmentOutcome::reject(
                &candidate_id,
                RunStage::Loading,
                RejectReason::Load {
                    source: candidate_id.clone(),
                    reason: err.to_string(),
                },
            )),
        }
    }

    /// Crops every region from a successful alignment.
    pub fn crop_regions(&self, alignment: &Alignment) -> AlignResult<Vec<CroppedArtifact>> {
        RegionCropper::new().crop_all(&alignment.aligned, &alignment.candidate_id, &self.regions)
    }

    fn run(&self, candidate_id: &str, candidate: &RgbImage) -> AlignResult<AlignmentOutcome> {
        if candidate.width() == 0 || candidate.height() == 0 {
            return Ok(AlignmentOutcome::reject(
                candidate_id,
                RunStage::Loading,
                RejectReason::Load {
                    source: candidate_id.to_string(),
                    reason: "image is empty".into(),
                },
            ));
        }

        let candidate_gray = to_gray(candidate);
        let candidate_features = self.extractor.extract(&candidate_gray)?;

        let matches = self
            .matcher
            .match_features(&self.template_features, &candidate_features)?;
        let required = self.estimator.config().min_correspondences;
        let rejection = |stage, reason| Rejection {
            candidate_id: candidate_id.to_string(),
            stage,
            reason,
            homography: None,
            scores: Vec::new(),
            correspondences: matches.len(),
        };
        if matches.len() < required {
            return Ok(AlignmentOutcome::Rejected(rejection(
                RunStage::Matching,
                RejectReason::InsufficientFeatures {
                    found: matches.len(),
                    required,
                },
            )));
        }

        let template_kps = self.template_features.keypoints();
        let candidate_kps = candidate_features.keypoints();
        let (src, dst): (Vec<[f64; 2]>, Vec<[f64; 2]>) = matches
            .iter()
            .map(|m| {
                let c = &candidate_kps[m.candidate_idx];
                let t = &template_kps[m.template_idx];
                ([c.x as f64, c.y as f64], [t.x as f64, t.y as f64])
            })
            .unzip();
        let homography = match self.estimator.estimate(&src, &dst) {
            Ok(h) => h,
            Err(EstimateFailure::TooFew { found, required }) => {
                return Ok(AlignmentOutcome::Rejected(rejection(
                    RunStage::Estimating,
                    RejectReason::InsufficientFeatures { found, required },
                )));
            }
            Err(EstimateFailure::Degenerate) => {
                return Ok(AlignmentOutcome::Rejected(rejection(
                    RunStage::Estimating,
                    RejectReason::DegenerateHomography,
                )));
            }
        };

        let (width, height) = self.template.dimensions();
        let aligned = self.aligner.warp(candidate, &homography, width, height)?;
        let aligned_gray = to_gray(&aligned);

        let verification = match self
            .verifier
            .verify(&self.template_gray, &aligned_gray, &self.regions)
        {
            Ok(v) => v,
            Err(AlignError::RegionOutOfBounds { region, .. }) => {
                let mut rejected = rejection(
                    RunStage::Verifying,
                    RejectReason::RegionOutOfBounds { region },
                );
                rejected.homography = Some(homography);
                return Ok(AlignmentOutcome::Rejected(rejected));
            }
            Err(err) => return Err(err),
        };

        match verification.verdict {
            Verdict::Accept => Ok(AlignmentOutcome::Succeeded(Alignment {
                candidate_id: candidate_id.to_string(),
                homography,
                aligned: Arc::new(aligned),
                scores: verification.scores,
                correspondences: matches.len(),
            })),
            Verdict::LowSimilarity {
                region,
                score,
                threshold,
            } => {
                let mut rejected = rejection(
                    RunStage::Verifying,
                    RejectReason::LowSimilarity {
                        region,
                        score,
                        threshold,
                    },
                );
                rejected.homography = Some(homography);
                rejected.scores = verification.scores;
                Ok(AlignmentOutcome::Rejected(rejected))
            }
        }
    }
}
