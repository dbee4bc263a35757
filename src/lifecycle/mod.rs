//! Model lifecycle: `Setup → Ready → Running → Ready`.
//!
//! [`ModelLifecycle`] owns every status change of a model. A model leaves
//! `Setup` only after each reference sample aligns against every region;
//! inspection runs move a `Ready` model to `Running` and always return it to
//! `Ready`, whatever the per-image results. Transitions of one model are
//! serialized by a per-model lock, so concurrent requests cannot race on the
//! status. Records live behind the [`ModelStore`] collaborator; the
//! alignment pipeline itself never writes to it.

pub mod inspect;
pub mod model;
pub mod store;
pub mod training;

use crate::image::io;
use crate::pipeline::batch::{align_batch, BatchConfig, BatchReport, CandidateSource};
use crate::pipeline::{AlignmentOutcome, AlignmentPipeline, PipelineConfig, RejectReason};
use crate::region::Region;
use crate::trace::{trace_event, trace_span};
use crate::util::{AlignError, AlignResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

pub use inspect::{AcceptAll, RegionClassifier, RegionVerdict};
pub use model::{
    ImageRef, InspectionRecord, InspectionRun, Model, ModelStatus, RegionRecord, RegionSpec,
    SampleFailure, SetupReport, SetupStep,
};
pub use store::{MemoryStore, ModelStore};
pub use training::{RegionTrainer, TrainingSet};

/// Lifecycle policy and the pipeline settings it aligns with.
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// Reference samples required before setup can complete.
    pub required_samples: usize,
    /// Upper bound on rejected exemplars per region.
    pub max_rejected_exemplars: usize,
    pub pipeline: PipelineConfig,
    pub batch: BatchConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            required_samples: 5,
            max_rejected_exemplars: 5,
            pipeline: PipelineConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Drives models through setup, readiness and inspection runs.
pub struct ModelLifecycle<S: ModelStore> {
    store: S,
    cfg: LifecycleConfig,
    locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl<S: ModelStore> ModelLifecycle<S> {
    pub fn new(store: S, cfg: LifecycleConfig) -> Self {
        Self {
            store,
            cfg,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.cfg
    }

    fn model_lock(&self, id: u64) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(id).or_default())
    }

    /// Loads a model and rejects it if it is mid-run.
    fn editable(&self, id: u64) -> AlignResult<Model> {
        let model = self.store.get_model(id)?;
        if model.status == ModelStatus::Running {
            return Err(invalid_state(&model, "setup or ready"));
        }
        Ok(model)
    }

    /// Persists an edited model; any edit sends it back to `Setup`.
    fn save_edit(&self, mut model: Model) -> AlignResult<Model> {
        model.status = ModelStatus::Setup;
        model.touch();
        self.store.update_model(&model)?;
        Ok(model)
    }

    pub fn get_model(&self, id: u64) -> AlignResult<Model> {
        self.store.get_model(id)
    }

    /// Creates an empty model in `Setup`.
    pub fn create_model(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> AlignResult<Model> {
        let model = self.store.insert_model(Model::draft(name, description))?;
        trace_event!("model_created", model = model.id);
        Ok(model)
    }

    /// Sets or replaces the template; existing regions must still fit.
    pub fn set_template(&self, id: u64, template: ImageRef) -> AlignResult<Model> {
        let lock = self.model_lock(id);
        let _guard = lock.lock();
        let mut model = self.editable(id)?;
        let (width, height) = io::image_dimensions(&template.path)?;
        for record in &model.regions {
            record.region.bounded_rect(width, height)?;
        }
        model.template = Some(template);
        self.save_edit(model)
    }

    /// Adds a reference sample known to show a passing part.
    pub fn add_sample(&self, id: u64, sample: ImageRef) -> AlignResult<Model> {
        let lock = self.model_lock(id);
        let _guard = lock.lock();
        let mut model = self.editable(id)?;
        model.samples.push(sample);
        self.save_edit(model)
    }

    /// Defines a region; it must fit inside the template.
    pub fn add_region(&self, id: u64, spec: RegionSpec) -> AlignResult<Region> {
        let lock = self.model_lock(id);
        let _guard = lock.lock();
        let mut model = self.editable(id)?;
        let template = model.template.as_ref().ok_or(AlignError::SetupIncomplete {
            model: id,
            missing: "template".into(),
        })?;
        if spec.rejected_exemplars.len() > self.cfg.max_rejected_exemplars {
            return Err(AlignError::InvalidConfig(format!(
                "region '{}' has {} rejected exemplars, at most {} allowed",
                spec.name,
                spec.rejected_exemplars.len(),
                self.cfg.max_rejected_exemplars
            )));
        }
        let (width, height) = io::image_dimensions(&template.path)?;

        let region = Region::new(
            format!("r{}", model.next_region),
            spec.name,
            spec.corner_a,
            spec.corner_b,
        )
        .with_descriptions(spec.pass_description, spec.fail_description);
        region.bounded_rect(width, height)?;

        model.next_region += 1;
        model.regions.push(RegionRecord {
            region: region.clone(),
            rejected_exemplars: spec.rejected_exemplars,
        });
        self.save_edit(model)?;
        Ok(region)
    }

    pub fn remove_region(&self, id: u64, region_id: &str) -> AlignResult<()> {
        let lock = self.model_lock(id);
        let _guard = lock.lock();
        let mut model = self.editable(id)?;
        let before = model.regions.len();
        model.regions.retain(|r| r.region.id() != region_id);
        if model.regions.len() == before {
            return Err(AlignError::UnknownRegion(region_id.to_string()));
        }
        self.save_edit(model)?;
        Ok(())
    }

    /// Deletes a model with its regions and runs.
    pub fn delete_model(&self, id: u64) -> AlignResult<()> {
        let lock = self.model_lock(id);
        let _guard = lock.lock();
        self.editable(id)?;
        self.store.delete_model(id)?;
        self.locks.lock().remove(&id);
        Ok(())
    }

    /// The next input the setup wizard should ask for.
    pub fn next_setup_step(&self, id: u64) -> AlignResult<SetupStep> {
        let model = self.store.get_model(id)?;
        Ok(self.setup_step(&model))
    }

    fn setup_step(&self, model: &Model) -> SetupStep {
        if model.template.is_none() {
            SetupStep::Template
        } else if model.samples.len() < self.cfg.required_samples {
            SetupStep::Samples {
                have: model.samples.len(),
                need: self.cfg.required_samples,
            }
        } else if model.regions.is_empty() {
            SetupStep::Regions
        } else {
            SetupStep::Complete
        }
    }

    fn pipeline_for(&self, model: &Model) -> AlignResult<AlignmentPipeline> {
        let template = model.template.as_ref().ok_or(AlignError::SetupIncomplete {
            model: model.id,
            missing: "template".into(),
        })?;
        AlignmentPipeline::from_path(&template.path, model.region_list(), self.cfg.pipeline.clone())
    }

    fn align_samples(&self, model: &Model) -> AlignResult<(Arc<AlignmentPipeline>, BatchReport)> {
        let pipeline = Arc::new(self.pipeline_for(model)?);
        let items = model
            .samples
            .iter()
            .map(|s| CandidateSource::Path(s.path.clone()))
            .collect();
        let report = align_batch(Arc::clone(&pipeline), items, &self.cfg.batch)?;
        Ok((pipeline, report))
    }

    /// Aligns every sample and moves the model to `Ready` if all succeed.
    ///
    /// Missing inputs fail with [`AlignError::SetupIncomplete`]; a region
    /// that does not fit fails with [`AlignError::RegionOutOfBounds`]. Sample
    /// rejections are not errors: the model stays in `Setup` and the report
    /// lists each failing sample with its stage and reason.
    pub fn complete_setup(&self, id: u64) -> AlignResult<SetupReport> {
        let _span = trace_span!("complete_setup", model = id).entered();
        let lock = self.model_lock(id);
        let _guard = lock.lock();
        let mut model = self.store.get_model(id)?;
        if model.status != ModelStatus::Setup {
            return Err(invalid_state(&model, "setup"));
        }
        let missing = match self.setup_step(&model) {
            SetupStep::Complete => None,
            SetupStep::Template => Some("template".to_string()),
            SetupStep::Samples { have, need } => Some(format!("samples ({have} of {need})")),
            SetupStep::Regions => Some("regions".to_string()),
        };
        if let Some(missing) = missing {
            return Err(AlignError::SetupIncomplete { model: id, missing });
        }

        let (pipeline, report) = self.align_samples(&model)?;
        if let Some(region) = report
            .outcomes
            .iter()
            .filter_map(AlignmentOutcome::reason)
            .find_map(|reason| match reason {
                RejectReason::RegionOutOfBounds { region } => Some(region.clone()),
                _ => None,
            })
        {
            let (width, height) = pipeline.template().dimensions();
            return Err(region_out_of_bounds(&model, &region, width, height));
        }

        let failures: Vec<SampleFailure> = model
            .samples
            .iter()
            .zip(&report.outcomes)
            .filter_map(|(sample, outcome)| match outcome {
                AlignmentOutcome::Succeeded(_) => None,
                AlignmentOutcome::Rejected(r) => Some(SampleFailure {
                    sample_id: sample.id.clone(),
                    stage: r.stage,
                    reason: r.reason.clone(),
                }),
            })
            .collect();

        if failures.is_empty() {
            model.status = ModelStatus::Ready;
            model.touch();
            self.store.update_model(&model)?;
        }
        trace_event!(
            "setup_completed",
            model = id,
            aligned = report.succeeded(),
            failed = failures.len()
        );
        Ok(SetupReport {
            model_id: id,
            status: model.status,
            aligned: report.succeeded(),
            failures,
        })
    }

    /// Runs an inspection over `images` and records it.
    ///
    /// Requires `Ready`. The model is `Running` for the duration and returns
    /// to `Ready` afterwards even when images fail or the run errors.
    pub fn run_inspection<C: RegionClassifier + ?Sized>(
        &self,
        id: u64,
        images: &[ImageRef],
        classifier: &C,
    ) -> AlignResult<InspectionRun> {
        let _span = trace_span!("inspection", model = id, images = images.len()).entered();
        let lock = self.model_lock(id);
        let _guard = lock.lock();
        let mut model = self.store.get_model(id)?;
        if model.status != ModelStatus::Ready {
            return Err(invalid_state(&model, "ready"));
        }
        model.status = ModelStatus::Running;
        model.touch();
        self.store.update_model(&model)?;

        let records = self.inspect_images(&model, images, classifier);

        model.status = ModelStatus::Ready;
        model.touch();
        self.store.update_model(&model)?;

        let run = self.store.insert_run(InspectionRun {
            id: 0,
            model_id: id,
            created_at: SystemTime::now(),
            records: records?,
        })?;
        trace_event!("inspection_done", run = run.id, passed = run.passed());
        Ok(run)
    }

    fn inspect_images<C: RegionClassifier + ?Sized>(
        &self,
        model: &Model,
        images: &[ImageRef],
        classifier: &C,
    ) -> AlignResult<Vec<InspectionRecord>> {
        let pipeline = Arc::new(self.pipeline_for(model)?);
        let items = images
            .iter()
            .map(|image| CandidateSource::Path(image.path.clone()))
            .collect();
        let report = align_batch(Arc::clone(&pipeline), items, &self.cfg.batch)?;
        Ok(images
            .iter()
            .zip(&report.outcomes)
            .map(|(image, outcome)| {
                let mut record = inspect::inspect_outcome(&pipeline, outcome, classifier);
                record.image_id = image.id.clone();
                record
            })
            .collect())
    }

    pub fn list_runs(&self, id: u64) -> AlignResult<Vec<InspectionRun>> {
        self.store.list_runs(id)
    }

    /// Builds one labeled set per region from the aligned samples.
    ///
    /// Accepted exemplars are the region crops of every sample that aligns;
    /// rejected exemplars are the operator's failing images for the region.
    pub fn training_sets(&self, id: u64) -> AlignResult<Vec<TrainingSet>> {
        let model = self.store.get_model(id)?;
        if model.status == ModelStatus::Setup {
            return Err(invalid_state(&model, "ready"));
        }
        let (pipeline, report) = self.align_samples(&model)?;

        let mut sets: Vec<TrainingSet> = model
            .regions
            .iter()
            .map(|record| -> AlignResult<TrainingSet> {
                let rejected = record
                    .rejected_exemplars
                    .iter()
                    .map(|image| io::load_color_image(&image.path))
                    .collect::<AlignResult<Vec<_>>>()?;
                Ok(TrainingSet {
                    region_id: record.region.id().to_string(),
                    region_name: record.region.name().to_string(),
                    pass_description: record.region.pass_description().to_string(),
                    fail_description: record.region.fail_description().to_string(),
                    accepted: Vec::new(),
                    rejected,
                })
            })
            .collect::<AlignResult<_>>()?;

        for outcome in &report.outcomes {
            if let AlignmentOutcome::Succeeded(alignment) = outcome {
                for (set, crop) in sets.iter_mut().zip(pipeline.crop_regions(alignment)?) {
                    set.accepted.push(crop);
                }
            }
        }
        Ok(sets)
    }

    /// Hands every region's training set to `trainer`.
    pub fn train<T: RegionTrainer>(
        &self,
        id: u64,
        trainer: &T,
    ) -> AlignResult<BTreeMap<String, T::Artifact>> {
        let _span = trace_span!("train", model = id).entered();
        self.training_sets(id)?
            .iter()
            .map(|set| -> AlignResult<(String, T::Artifact)> {
                Ok((set.region_id.clone(), trainer.train(set)?))
            })
            .collect()
    }
}

fn invalid_state(model: &Model, expected: &'static str) -> AlignError {
    AlignError::InvalidState {
        model: model.id,
        actual: model.status.as_str(),
        expected,
    }
}

fn region_out_of_bounds(model: &Model, region_id: &str, width: u32, height: u32) -> AlignError {
    let rect = model.region(region_id).map(|r| r.region.rect());
    AlignError::RegionOutOfBounds {
        region: region_id.to_string(),
        left: rect.map_or(0, |r| r.left),
        top: rect.map_or(0, |r| r.top),
        right: rect.map_or(0, |r| r.right),
        bottom: rect.map_or(0, |r| r.bottom),
        img_width: width,
        img_height: height,
    }
}
