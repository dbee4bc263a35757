//! Per-image inspection verdicts from alignment outcomes and region crops.

use super::model::InspectionRecord;
use crate::crop::CroppedArtifact;
use crate::pipeline::{AlignmentOutcome, AlignmentPipeline};
use crate::region::Region;
use crate::util::AlignResult;

/// Pass/fail decision for one region crop.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionVerdict {
    pub passed: bool,
    pub reason: String,
}

/// External classifier that judges cropped regions.
pub trait RegionClassifier {
    fn classify(&self, region: &Region, crop: &CroppedArtifact) -> AlignResult<RegionVerdict>;
}

/// Passes every crop.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl RegionClassifier for AcceptAll {
    fn classify(&self, _region: &Region, _crop: &CroppedArtifact) -> AlignResult<RegionVerdict> {
        Ok(RegionVerdict {
            passed: true,
            reason: "All regions passed".into(),
        })
    }
}

/// Turns one alignment outcome into an inspection record.
///
/// A rejected alignment fails the image with the rejection as reason. For a
/// successful one every region is cropped and classified; the image passes
/// only when every region does, and the first failing region's reason is
/// reported. Classifier errors fail the image instead of the run.
pub(crate) fn inspect_outcome<C: RegionClassifier + ?Sized>(
    pipeline: &AlignmentPipeline,
    outcome: &AlignmentOutcome,
    classifier: &C,
) -> InspectionRecord {
    let image_id = outcome.candidate_id().to_string();
    let alignment = match outcome {
        AlignmentOutcome::Succeeded(alignment) => alignment,
        AlignmentOutcome::Rejected(rejection) => {
            return InspectionRecord {
                image_id,
                passed: false,
                reason: format!("alignment rejected at {}: {}", rejection.stage, rejection.reason),
            };
        }
    };

    let crops = match pipeline.crop_regions(alignment) {
        Ok(crops) => crops,
        Err(err) => {
            return InspectionRecord {
                image_id,
                passed: false,
                reason: err.to_string(),
            };
        }
    };

    for (region, crop) in pipeline.regions().iter().zip(&crops) {
        match classifier.classify(region, crop) {
            Ok(verdict) if verdict.passed => {}
            Ok(verdict) => {
                return InspectionRecord {
                    image_id,
                    passed: false,
                    reason: format!("{}: {}", region.name(), verdict.reason),
                };
            }
            Err(err) => {
                return InspectionRecord {
                    image_id,
                    passed: false,
                    reason: format!("{}: {err}", region.name()),
                };
            }
        }
    }

    InspectionRecord {
        image_id,
        passed: true,
        reason: "All regions passed".into(),
    }
}
