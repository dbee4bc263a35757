//! Model aggregate and run records.

use crate::pipeline::{RejectReason, RunStage};
use crate::region::Region;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Handle to an image file owned by the persistence layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub id: String,
    pub path: PathBuf,
}

impl ImageRef {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// Lifecycle state of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelStatus {
    Setup,
    Ready,
    Running,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Setup => "setup",
            ModelStatus::Ready => "ready",
            ModelStatus::Running => "running",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A region plus the exemplar images of its failing appearance.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionRecord {
    pub region: Region,
    pub rejected_exemplars: Vec<ImageRef>,
}

/// Operator input for a new region; the lifecycle assigns the id.
#[derive(Clone, Debug, Default)]
pub struct RegionSpec {
    pub name: String,
    pub corner_a: (i64, i64),
    pub corner_b: (i64, i64),
    pub pass_description: String,
    pub fail_description: String,
    pub rejected_exemplars: Vec<ImageRef>,
}

/// Template, reference samples and regions that define an inspection.
#[derive(Clone, Debug)]
pub struct Model {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub template: Option<ImageRef>,
    pub samples: Vec<ImageRef>,
    pub regions: Vec<RegionRecord>,
    pub status: ModelStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub(crate) next_region: u64,
}

impl Model {
    /// A fresh model in `Setup`; the store assigns the id on insert.
    pub fn draft(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: 0,
            name: name.into(),
            description: description.into(),
            template: None,
            samples: Vec::new(),
            regions: Vec::new(),
            status: ModelStatus::Setup,
            created_at: now,
            updated_at: now,
            next_region: 1,
        }
    }

    /// Regions without their exemplars, in definition order.
    pub fn region_list(&self) -> Vec<Region> {
        self.regions.iter().map(|r| r.region.clone()).collect()
    }

    pub fn region(&self, region_id: &str) -> Option<&RegionRecord> {
        self.regions.iter().find(|r| r.region.id() == region_id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}

/// Next input the setup wizard needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupStep {
    Template,
    Samples { have: usize, need: usize },
    Regions,
    /// Every input is present; setup can be completed.
    Complete,
}

/// A sample that failed alignment during setup.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleFailure {
    pub sample_id: String,
    pub stage: RunStage,
    pub reason: RejectReason,
}

/// Result of a setup-completion attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct SetupReport {
    pub model_id: u64,
    pub status: ModelStatus,
    pub aligned: usize,
    pub failures: Vec<SampleFailure>,
}

impl SetupReport {
    pub fn is_ready(&self) -> bool {
        self.status == ModelStatus::Ready
    }
}

/// Verdict for one inspected image.
#[derive(Clone, Debug, PartialEq)]
pub struct InspectionRecord {
    pub image_id: String,
    pub passed: bool,
    pub reason: String,
}

/// One inspection run over a set of images.
#[derive(Clone, Debug, PartialEq)]
pub struct InspectionRun {
    pub id: u64,
    pub model_id: u64,
    pub created_at: SystemTime,
    pub records: Vec<InspectionRecord>,
}

impl InspectionRun {
    pub fn passed(&self) -> usize {
        self.records.iter().filter(|r| r.passed).count()
    }

    /// `"{passed}/{total} PASS"`.
    pub fn summary(&self) -> String {
        format!("{}/{} PASS", self.passed(), self.records.len())
    }
}
