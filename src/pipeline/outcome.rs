//! Tagged results of one alignment run.

use crate::homography::Homography;
use crate::verify::RegionScore;
use image::RgbImage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Stage of a single alignment run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunStage {
    Loading,
    Extracting,
    Matching,
    Estimating,
    Warping,
    Verifying,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStage::Loading => "loading",
            RunStage::Extracting => "extracting",
            RunStage::Matching => "matching",
            RunStage::Estimating => "estimating",
            RunStage::Warping => "warping",
            RunStage::Verifying => "verifying",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a candidate was not accepted.
#[derive(Clone, Debug, PartialEq)]
pub enum RejectReason {
    /// The candidate could not be read.
    Load { source: String, reason: String },
    /// Too few ratio-test correspondences to estimate a homography.
    InsufficientFeatures { found: usize, required: usize },
    /// No non-degenerate homography could be fitted.
    DegenerateHomography,
    /// The lowest-scoring region fell below the similarity threshold.
    LowSimilarity {
        region: String,
        score: f32,
        threshold: f32,
    },
    /// A region rectangle does not fit inside the aligned canvas.
    RegionOutOfBounds { region: String },
    /// The batch per-item time limit expired.
    Timeout { after: Duration },
    /// An unexpected error aborted the run (including a worker panic).
    Failed { reason: String },
}

impl RejectReason {
    /// Short machine-friendly tag.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::Load { .. } => "load",
            RejectReason::InsufficientFeatures { .. } => "insufficient_features",
            RejectReason::DegenerateHomography => "degenerate_homography",
            RejectReason::LowSimilarity { .. } => "low_similarity",
            RejectReason::RegionOutOfBounds { .. } => "region_out_of_bounds",
            RejectReason::Timeout { .. } => "timeout",
            RejectReason::Failed { .. } => "failed",
        }
    }

    /// True for reasons caused by the model definition rather than the image.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(self, RejectReason::RegionOutOfBounds { .. })
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Load { source, reason } => write!(f, "cannot load '{source}': {reason}"),
            RejectReason::InsufficientFeatures { found, required } => write!(
                f,
                "insufficient features: {found} correspondences, {required} required"
            ),
            RejectReason::DegenerateHomography => f.write_str("degenerate homography"),
            RejectReason::LowSimilarity {
                region,
                score,
                threshold,
            } => write!(
                f,
                "region '{region}' similarity {score:.3} below {threshold:.3}"
            ),
            RejectReason::RegionOutOfBounds { region } => {
                write!(f, "region '{region}' is outside the aligned image")
            }
            RejectReason::Timeout { after } => write!(f, "timed out after {after:?}"),
            RejectReason::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Payload of a successful alignment.
#[derive(Clone, Debug)]
pub struct Alignment {
    pub candidate_id: String,
    pub homography: Homography,
    /// Candidate warped onto the template canvas.
    pub aligned: Arc<RgbImage>,
    /// Per-region scores in region order.
    pub scores: Vec<RegionScore>,
    pub correspondences: usize,
}

/// Payload of a rejected alignment.
#[derive(Clone, Debug)]
pub struct Rejection {
    pub candidate_id: String,
    /// Stage that rejected the run; batch-level failures (timeouts, worker
    /// errors) report `Loading` since the run's progress is not observed.
    pub stage: RunStage,
    pub reason: RejectReason,
    /// Set when the run got past estimation.
    pub homography: Option<Homography>,
    /// Scores computed before rejection (empty before verification).
    pub scores: Vec<RegionScore>,
    pub correspondences: usize,
}

/// Result of aligning one candidate against one model.
#[derive(Clone, Debug)]
pub enum AlignmentOutcome {
    Succeeded(Alignment),
    Rejected(Rejection),
}

impl AlignmentOutcome {
    pub(crate) fn reject(candidate_id: &str, stage: RunStage, reason: RejectReason) -> Self {
        AlignmentOutcome::Rejected(Rejection {
            candidate_id: candidate_id.to_string(),
            stage,
            reason,
            homography: None,
            scores: Vec::new(),
            correspondences: 0,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AlignmentOutcome::Succeeded(_))
    }

    pub fn candidate_id(&self) -> &str {
        match self {
            AlignmentOutcome::Succeeded(a) => &a.candidate_id,
            AlignmentOutcome::Rejected(r) => &r.candidate_id,
        }
    }

    pub fn homography(&self) -> Option<&Homography> {
        match self {
            AlignmentOutcome::Succeeded(a) => Some(&a.homography),
            AlignmentOutcome::Rejected(r) => r.homography.as_ref(),
        }
    }

    pub fn scores(&self) -> &[RegionScore] {
        match self {
            AlignmentOutcome::Succeeded(a) => &a.scores,
            AlignmentOutcome::Rejected(r) => &r.scores,
        }
    }

    /// Rejection reason, if any.
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            AlignmentOutcome::Succeeded(_) => None,
            AlignmentOutcome::Rejected(r) => Some(&r.reason),
        }
    }

    /// Stage that rejected the run, if any.
    pub fn stage(&self) -> Option<RunStage> {
        match self {
            AlignmentOutcome::Succeeded(_) => None,
            AlignmentOutcome::Rejected(r) => Some(r.stage),
        }
    }
}
