//! roialign aligns photographs of a part to a reference template and
//! verifies named regions of interest before cropping them.
//!
//! The pipeline extracts scale/rotation-invariant features, matches them
//! with a randomized kd-forest and Lowe's ratio test, fits a homography with
//! RANSAC, warps the candidate onto the template canvas and accepts the
//! alignment only when every region correlates with the template. A model
//! lifecycle on top decides when a model is ready for inspection runs.
//!
//! Tracing spans and events are emitted when the `tracing` feature is on.

mod candidate;
pub mod crop;
pub mod features;
pub mod homography;
pub mod image;
pub mod kernel;
pub mod lifecycle;
pub mod lowlevel;
pub mod matching;
pub mod pipeline;
pub mod region;
mod trace;
pub mod util;
pub mod verify;
pub mod warp;

pub use crop::{CroppedArtifact, RegionCropper};
pub use features::{ExtractorConfig, FeatureExtractor, FeatureSet, Keypoint};
pub use homography::{EstimateFailure, Homography, HomographyEstimator, RansacConfig};
pub use crate::image::ImageView;
pub use lifecycle::{LifecycleConfig, MemoryStore, ModelLifecycle, ModelStatus, ModelStore};
pub use matching::{Correspondence, CorrespondenceMatcher, MatcherConfig};
pub use pipeline::batch::{align_batch, BatchConfig, BatchReport, CandidateSource};
pub use pipeline::{
    Alignment, AlignmentOutcome, AlignmentPipeline, PipelineConfig, RejectReason, Rejection,
    RunStage,
};
pub use region::{Rect, Region};
pub use util::{AlignError, AlignResult};
pub use verify::{RegionScore, RegionVerifier, Verdict, Verification, VerifyConfig};
pub use warp::ImageAligner;
