use roialign::lifecycle::{ImageRef, LifecycleConfig, RegionSpec};
use roialign::{
    BatchConfig, ExtractorConfig, MatcherConfig, PipelineConfig, RansacConfig, Region,
    VerifyConfig,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExtractorConfigJson {
    max_features: usize,
    fast_threshold: u8,
    pyramid_levels: usize,
    scale_factor: f32,
    blur_sigma: f32,
    min_level_side: u32,
}

impl Default for ExtractorConfigJson {
    fn default() -> Self {
        let cfg = ExtractorConfig::default();
        Self {
            max_features: cfg.max_features,
            fast_threshold: cfg.fast_threshold,
            pyramid_levels: cfg.pyramid_levels,
            scale_factor: cfg.scale_factor,
            blur_sigma: cfg.blur_sigma,
            min_level_side: cfg.min_level_side,
        }
    }
}

impl From<&ExtractorConfigJson> for ExtractorConfig {
    fn from(value: &ExtractorConfigJson) -> Self {
        Self {
            max_features: value.max_features,
            fast_threshold: value.fast_threshold,
            pyramid_levels: value.pyramid_levels,
            scale_factor: value.scale_factor,
            blur_sigma: value.blur_sigma,
            min_level_side: value.min_level_side,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MatcherConfigJson {
    trees: usize,
    checks: usize,
    ratio: f32,
    leaf_size: usize,
    index_seed: u64,
}

impl Default for MatcherConfigJson {
    fn default() -> Self {
        let cfg = MatcherConfig::default();
        Self {
            trees: cfg.trees,
            checks: cfg.checks,
            ratio: cfg.ratio,
            leaf_size: cfg.leaf_size,
            index_seed: cfg.index_seed,
        }
    }
}

impl From<&MatcherConfigJson> for MatcherConfig {
    fn from(value: &MatcherConfigJson) -> Self {
        Self {
            trees: value.trees,
            checks: value.checks,
            ratio: value.ratio,
            leaf_size: value.leaf_size,
            index_seed: value.index_seed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RansacConfigJson {
    threshold: f64,
    max_iters: usize,
    confidence: f64,
    min_correspondences: usize,
    seed: Option<u64>,
}

impl Default for RansacConfigJson {
    fn default() -> Self {
        let cfg = RansacConfig::default();
        Self {
            threshold: cfg.threshold,
            max_iters: cfg.max_iters,
            confidence: cfg.confidence,
            min_correspondences: cfg.min_correspondences,
            seed: cfg.seed,
        }
    }
}

impl From<&RansacConfigJson> for RansacConfig {
    fn from(value: &RansacConfigJson) -> Self {
        Self {
            threshold: value.threshold,
            max_iters: value.max_iters,
            confidence: value.confidence,
            min_correspondences: value.min_correspondences,
            seed: value.seed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VerifyConfigJson {
    min_similarity: f32,
    search_margin: u32,
}

impl Default for VerifyConfigJson {
    fn default() -> Self {
        let cfg = VerifyConfig::default();
        Self {
            min_similarity: cfg.min_similarity,
            search_margin: cfg.search_margin,
        }
    }
}

impl From<&VerifyConfigJson> for VerifyConfig {
    fn from(value: &VerifyConfigJson) -> Self {
        Self {
            min_similarity: value.min_similarity,
            search_margin: value.search_margin,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BatchConfigJson {
    workers: usize,
    /// Per-image limit in seconds; `null` disables it.
    timeout_secs: Option<f64>,
}

impl Default for BatchConfigJson {
    fn default() -> Self {
        let cfg = BatchConfig::default();
        Self {
            workers: cfg.workers,
            timeout_secs: cfg.timeout.map(|t| t.as_secs_f64()),
        }
    }
}

impl BatchConfigJson {
    fn to_batch(&self) -> Result<BatchConfig, String> {
        let timeout = match self.timeout_secs {
            Some(secs) if !secs.is_finite() || secs <= 0.0 => {
                return Err(format!("batch.timeout_secs must be > 0, got {secs}"));
            }
            Some(secs) => Some(Duration::from_secs_f64(secs)),
            None => None,
        };
        Ok(BatchConfig {
            workers: self.workers,
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegionJson {
    pub name: String,
    pub corner_a: (i64, i64),
    pub corner_b: (i64, i64),
    pub pass_description: String,
    pub fail_description: String,
    pub rejected_exemplars: Vec<PathBuf>,
}

impl Default for RegionJson {
    fn default() -> Self {
        Self {
            name: String::new(),
            corner_a: (0, 0),
            corner_b: (0, 0),
            pass_description: String::new(),
            fail_description: String::new(),
            rejected_exemplars: Vec::new(),
        }
    }
}

impl RegionJson {
    pub fn to_spec(&self) -> RegionSpec {
        RegionSpec {
            name: self.name.clone(),
            corner_a: self.corner_a,
            corner_b: self.corner_b,
            pass_description: self.pass_description.clone(),
            fail_description: self.fail_description.clone(),
            rejected_exemplars: self.rejected_exemplars.iter().map(|p| image_ref(p)).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub name: String,
    pub description: String,
    pub template_path: PathBuf,
    pub samples: Vec<PathBuf>,
    pub regions: Vec<RegionJson>,
    pub required_samples: usize,
    pub max_rejected_exemplars: usize,
    pub parallel: bool,
    pub extractor: ExtractorConfigJson,
    pub matcher: MatcherConfigJson,
    pub ransac: RansacConfigJson,
    pub verify: VerifyConfigJson,
    pub batch: BatchConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        let lifecycle = LifecycleConfig::default();
        Self {
            name: "model".into(),
            description: String::new(),
            template_path: PathBuf::new(),
            samples: Vec::new(),
            regions: Vec::new(),
            required_samples: lifecycle.required_samples,
            max_rejected_exemplars: lifecycle.max_rejected_exemplars,
            parallel: lifecycle.pipeline.parallel,
            extractor: ExtractorConfigJson::default(),
            matcher: MatcherConfigJson::default(),
            ransac: RansacConfigJson::default(),
            verify: VerifyConfigJson::default(),
            batch: BatchConfigJson::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.template_path.as_os_str().is_empty() {
            return Err("template_path must be set in the config".into());
        }
        if self.regions.is_empty() {
            return Err("at least one region must be defined".into());
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            extractor: (&self.extractor).into(),
            matcher: (&self.matcher).into(),
            ransac: (&self.ransac).into(),
            verify: (&self.verify).into(),
            parallel: self.parallel,
        }
    }

    pub fn batch(&self) -> Result<BatchConfig, String> {
        self.batch.to_batch()
    }

    pub fn lifecycle(&self) -> Result<LifecycleConfig, String> {
        Ok(LifecycleConfig {
            required_samples: self.required_samples,
            max_rejected_exemplars: self.max_rejected_exemplars,
            pipeline: self.pipeline(),
            batch: self.batch()?,
        })
    }

    /// Regions with the ids the lifecycle would assign (`r1`, `r2`, ...).
    pub fn region_list(&self) -> Vec<Region> {
        self.regions
            .iter()
            .enumerate()
            .map(|(i, r)| {
                Region::new(format!("r{}", i + 1), r.name.clone(), r.corner_a, r.corner_b)
                    .with_descriptions(r.pass_description.clone(), r.fail_description.clone())
            })
            .collect()
    }
}

/// Uses the file stem as the image id.
pub fn image_ref(path: &Path) -> ImageRef {
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();
    ImageRef::new(id, path)
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn empty_document_takes_library_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        let pipeline = cfg.pipeline();
        assert_eq!(pipeline.matcher.ratio, 0.7);
        assert_eq!(pipeline.ransac.min_correspondences, 11);
        assert_eq!(pipeline.verify.min_similarity, 0.40);
        assert_eq!(cfg.required_samples, 5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn example_document_parses() {
        let cfg: Config = serde_json::from_str(crate::EXAMPLE_JSON).unwrap();
        cfg.validate().unwrap();
        let regions = cfg.region_list();
        assert_eq!(regions[0].id(), "r1");
        assert!(cfg.batch().unwrap().timeout.is_some());
    }

    #[test]
    fn non_positive_timeout_is_rejected() {
        let cfg: Config = serde_json::from_str(r#"{"batch": {"timeout_secs": 0}}"#).unwrap();
        assert!(cfg.batch().is_err());
        let cfg: Config = serde_json::from_str(r#"{"batch": {"timeout_secs": null}}"#).unwrap();
        assert!(cfg.batch().unwrap().timeout.is_none());
    }
}
