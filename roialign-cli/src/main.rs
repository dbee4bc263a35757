mod config;

use clap::{Parser, Subcommand};
use config::{image_ref, Config};
use roialign::image::io::{load_color_image, save_color_image};
use roialign::lifecycle::{AcceptAll, InspectionRun, SetupReport};
use roialign::{
    AlignmentOutcome, AlignmentPipeline, CroppedArtifact, MemoryStore, ModelLifecycle,
    RegionCropper,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Region-of-interest alignment CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON model configuration.
    #[arg(short, long, value_name = "FILE", default_value = "model.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Align one candidate against the template.
    Align {
        #[arg(long, value_name = "PATH")]
        candidate: PathBuf,
        /// Write the aligned image and region crops here on success.
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Align every reference sample and report whether the model is ready.
    Setup,
    /// Set the model up, then inspect the given images.
    Inspect {
        #[arg(long, value_name = "PATH", num_args = 1.., required = true)]
        images: Vec<PathBuf>,
    },
    /// Crop every region from an already aligned image.
    Crop {
        #[arg(long, value_name = "PATH")]
        aligned: PathBuf,
        #[arg(long, value_name = "DIR")]
        output: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct ScoreRecord {
    region_id: String,
    score: f32,
}

#[derive(Debug, Serialize)]
struct OutcomeRecord {
    candidate_id: String,
    success: bool,
    stage: Option<String>,
    kind: Option<String>,
    reason: Option<String>,
    homography: Option<[[f64; 3]; 3]>,
    inliers: Option<usize>,
    scores: Vec<ScoreRecord>,
    files: Vec<PathBuf>,
}

impl From<&AlignmentOutcome> for OutcomeRecord {
    fn from(value: &AlignmentOutcome) -> Self {
        Self {
            candidate_id: value.candidate_id().to_string(),
            success: value.is_success(),
            stage: value.stage().map(|s| s.as_str().to_string()),
            kind: value.reason().map(|r| r.kind().to_string()),
            reason: value.reason().map(|r| r.to_string()),
            homography: value.homography().map(|h| h.to_array()),
            inliers: value.homography().map(|h| h.inlier_count()),
            scores: value
                .scores()
                .iter()
                .map(|s| ScoreRecord {
                    region_id: s.region_id.clone(),
                    score: s.score,
                })
                .collect(),
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureRecord {
    sample_id: String,
    stage: String,
    kind: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct SetupRecord {
    model_id: u64,
    status: String,
    ready: bool,
    aligned: usize,
    failures: Vec<FailureRecord>,
}

impl From<&SetupReport> for SetupRecord {
    fn from(value: &SetupReport) -> Self {
        Self {
            model_id: value.model_id,
            status: value.status.as_str().to_string(),
            ready: value.is_ready(),
            aligned: value.aligned,
            failures: value
                .failures
                .iter()
                .map(|f| FailureRecord {
                    sample_id: f.sample_id.clone(),
                    stage: f.stage.as_str().to_string(),
                    kind: f.reason.kind().to_string(),
                    reason: f.reason.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct InspectionImageRecord {
    image_id: String,
    passed: bool,
    reason: String,
}

#[derive(Debug, Serialize)]
struct InspectionRecordJson {
    run_id: u64,
    summary: String,
    records: Vec<InspectionImageRecord>,
}

impl From<&InspectionRun> for InspectionRecordJson {
    fn from(value: &InspectionRun) -> Self {
        Self {
            run_id: value.id,
            summary: value.summary(),
            records: value
                .records
                .iter()
                .map(|r| InspectionImageRecord {
                    image_id: r.image_id.clone(),
                    passed: r.passed,
                    reason: r.reason.clone(),
                })
                .collect(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("roialign=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }
    let Some(command) = cli.command else {
        return Err("a command is required (align, setup, inspect, crop)".into());
    };

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    config.validate()?;

    let json = match command {
        Command::Align { candidate, output } => align(&config, &candidate, output.as_deref())?,
        Command::Setup => {
            let (_, report) = setup(&config)?;
            serde_json::to_string_pretty(&SetupRecord::from(&report))?
        }
        Command::Inspect { images } => inspect(&config, &images)?,
        Command::Crop { aligned, output } => crop(&config, &aligned, &output)?,
    };
    println!("{json}");
    Ok(())
}

fn align(
    config: &Config,
    candidate: &Path,
    output: Option<&Path>,
) -> Result<String, Box<dyn std::error::Error>> {
    let pipeline = AlignmentPipeline::from_path(
        &config.template_path,
        config.region_list(),
        config.pipeline(),
    )?;
    let outcome = pipeline.align_path(candidate)?;
    let mut record = OutcomeRecord::from(&outcome);

    if let (AlignmentOutcome::Succeeded(alignment), Some(dir)) = (&outcome, output) {
        fs::create_dir_all(dir)?;
        let stem = image_ref(candidate).id;
        let aligned_path = dir.join(format!("{stem}_aligned.png"));
        save_color_image(&aligned_path, &alignment.aligned)?;
        record.files.push(aligned_path);
        let crops = pipeline.crop_regions(alignment)?;
        record.files.extend(save_all(&crops, dir)?);
    }
    Ok(serde_json::to_string_pretty(&record)?)
}

fn setup(
    config: &Config,
) -> Result<(ModelLifecycle<MemoryStore>, SetupReport), Box<dyn std::error::Error>> {
    let lifecycle = ModelLifecycle::new(MemoryStore::new(), config.lifecycle()?);
    let model = lifecycle.create_model(config.name.clone(), config.description.clone())?;
    lifecycle.set_template(model.id, image_ref(&config.template_path))?;
    for sample in &config.samples {
        lifecycle.add_sample(model.id, image_ref(sample))?;
    }
    for region in &config.regions {
        lifecycle.add_region(model.id, region.to_spec())?;
    }
    let report = lifecycle.complete_setup(model.id)?;
    Ok((lifecycle, report))
}

fn inspect(config: &Config, images: &[PathBuf]) -> Result<String, Box<dyn std::error::Error>> {
    let (lifecycle, report) = setup(config)?;
    if !report.is_ready() {
        let failures = serde_json::to_string_pretty(&SetupRecord::from(&report))?;
        return Err(format!("model setup did not complete:\n{failures}").into());
    }
    let refs: Vec<_> = images.iter().map(|p| image_ref(p)).collect();
    let run = lifecycle.run_inspection(report.model_id, &refs, &AcceptAll)?;
    Ok(serde_json::to_string_pretty(&InspectionRecordJson::from(&run))?)
}

fn crop(
    config: &Config,
    aligned: &Path,
    output: &Path,
) -> Result<String, Box<dyn std::error::Error>> {
    let image = load_color_image(aligned)?;
    let source_id = aligned.display().to_string();
    let crops = RegionCropper::new().crop_all(&image, &source_id, &config.region_list())?;
    let files = save_all(&crops, output)?;
    Ok(serde_json::to_string_pretty(&files)?)
}

fn save_all(
    crops: &[CroppedArtifact],
    dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut files = Vec::with_capacity(crops.len());
    for crop in crops {
        files.push(crop.save_to(dir)?);
    }
    Ok(files)
}
