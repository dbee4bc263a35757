//! Labeled crop sets handed to an external trainer.

use crate::crop::CroppedArtifact;
use crate::util::AlignResult;
use image::RgbImage;

/// Accepted and rejected exemplars of one region.
#[derive(Clone, Debug)]
pub struct TrainingSet {
    pub region_id: String,
    pub region_name: String,
    pub pass_description: String,
    pub fail_description: String,
    /// Region crops of the aligned reference samples.
    pub accepted: Vec<CroppedArtifact>,
    /// Operator-supplied images of the failing appearance.
    pub rejected: Vec<RgbImage>,
}

/// External service that trains a per-region classifier.
///
/// The returned artifact is opaque to this crate.
pub trait RegionTrainer {
    type Artifact;

    fn train(&self, set: &TrainingSet) -> AlignResult<Self::Artifact>;
}
