//! Run Configuration Module
//!
//! One explicit configuration object for training, validation, benchmarking
//! and testing. It is built by the CLI (optionally from a JSON file) and
//! passed into every component constructor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationVersion;
use crate::utils::error::{Result, SaliencyError};

/// Held-out datasets evaluated after training
pub const BENCHMARK_DATASETS: [&str; 5] = ["DUTS", "DUT-O", "HKU-IS", "ECSSD", "PASCAL-S"];

/// Learning rate scheduler selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SchedulerKind {
    /// Reduce on plateau of the validation loss
    Reduce,
    /// Multiply the LR by `lr_factor` every `step_size` epochs
    Step,
    /// Cosine annealing over all epochs
    Cosine,
}

impl SchedulerKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "reduce" | "plateau" => Ok(Self::Reduce),
            "step" => Ok(Self::Step),
            "cos" | "cosine" => Ok(Self::Cosine),
            other => Err(SaliencyError::Configuration(format!(
                "unknown scheduler '{}', expected Reduce, Step or Cosine",
                other
            ))),
        }
    }
}

/// Per-map loss selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CriterionKind {
    /// Binary cross-entropy
    Bce,
    /// Soft IoU
    Iou,
    /// BCE + IoU
    Structure,
}

impl CriterionKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bce" => Ok(Self::Bce),
            "iou" => Ok(Self::Iou),
            "structure" | "api" => Ok(Self::Structure),
            other => Err(SaliencyError::Configuration(format!(
                "unknown criterion '{}', expected bce, iou or structure",
                other
            ))),
        }
    }
}

/// Geometry of the random resize/crop stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CropConfig {
    /// Side of the output after either branch
    pub base_size: u32,
    /// Side of the enlarged canvas the crop is taken from
    pub canvas_size: u32,
    /// Draws above this value take the plain resize branch
    pub crop_threshold: f32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            base_size: 640,
            canvas_size: 960,
            crop_threshold: 0.3,
        }
    }
}

/// Full run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root holding `<dataset>/Train` and `<dataset>/Test`
    pub data_path: PathBuf,
    /// Training dataset name (also the dataset tested by the `test` command)
    pub dataset: String,
    /// Directory for checkpoints, scalar logs, plots and reports
    pub model_path: PathBuf,

    /// Square side the network consumes
    pub img_size: usize,
    /// Augmentation version (1 or 2)
    pub aug_ver: u8,
    pub crop: CropConfig,

    pub batch_size: usize,
    /// Worker threads for sample loading (0 loads on the calling thread)
    pub num_workers: usize,
    pub epochs: usize,
    /// Early stopping and plateau patience; training halts after `patience + 5` flat epochs
    pub patience: usize,
    /// Gradient-norm clipping threshold
    pub clipping: f64,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// LR multiplier applied by the Reduce and Step schedulers
    pub lr_factor: f64,
    /// Epochs between decays for the Step scheduler
    pub step_size: usize,
    pub scheduler: SchedulerKind,
    pub criterion: CriterionKind,

    /// Split seed; a random one is drawn and logged when absent
    pub seed: Option<u64>,
    /// Per-sample augmentation seed; augmentation is unseeded when absent
    pub aug_seed: Option<u64>,
    /// Fraction of the training set held out for validation
    pub val_ratio: f64,

    /// Accepted for compatibility, training runs on a single device
    pub multi_gpu: bool,

    /// Output root for prediction maps; maps are not written when absent
    pub save_map: Option<PathBuf>,
    /// Background composited under written maps
    pub background: Option<PathBuf>,
    /// Checkpoint stem loaded by the tester
    pub model_name: String,
    /// Whether the test set has ground truth masks
    pub have_gt: bool,
    pub benchmark_datasets: Vec<String>,

    /// Width of the first stage of the reference network
    pub base_filters: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            dataset: "DUTS".to_string(),
            model_path: PathBuf::from("results"),
            img_size: 320,
            aug_ver: 2,
            crop: CropConfig::default(),
            batch_size: 16,
            num_workers: 4,
            epochs: 100,
            patience: 5,
            clipping: 2.0,
            learning_rate: 5e-5,
            weight_decay: 1e-4,
            lr_factor: 0.1,
            step_size: 10,
            scheduler: SchedulerKind::Reduce,
            criterion: CriterionKind::Structure,
            seed: Some(42),
            aug_seed: None,
            val_ratio: 0.2,
            multi_gpu: false,
            save_map: None,
            background: Some(PathBuf::from("background/bg.jpg")),
            model_name: "best_model".to_string(),
            have_gt: true,
            benchmark_datasets: BENCHMARK_DATASETS.iter().map(|s| s.to_string()).collect(),
            base_filters: 16,
        }
    }
}

impl RunConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(SaliencyError::Configuration(msg.to_string()));

        if self.img_size == 0 {
            return fail("img_size must be greater than 0");
        }
        AugmentationVersion::from_number(self.aug_ver)?;
        if self.batch_size == 0 {
            return fail("batch_size must be greater than 0");
        }
        if self.epochs == 0 {
            return fail("epochs must be greater than 0");
        }
        if !(self.clipping > 0.0) {
            return fail("clipping must be positive");
        }
        if !(self.learning_rate > 0.0) {
            return fail("learning_rate must be positive");
        }
        if self.weight_decay < 0.0 {
            return fail("weight_decay must not be negative");
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return fail("lr_factor must be in range (0.0, 1.0)");
        }
        if !(self.val_ratio > 0.0 && self.val_ratio < 1.0) {
            return fail("val_ratio must be in range (0.0, 1.0)");
        }
        if self.crop.base_size == 0 || self.crop.canvas_size < self.crop.base_size {
            return fail("crop.canvas_size must be at least crop.base_size (> 0)");
        }
        if !(0.0..=1.0).contains(&self.crop.crop_threshold) {
            return fail("crop.crop_threshold must be in range [0.0, 1.0]");
        }
        if self.model_name.trim().is_empty() {
            return fail("model_name must not be empty");
        }

        Ok(())
    }

    pub fn augmentation_version(&self) -> Result<AugmentationVersion> {
        AugmentationVersion::from_number(self.aug_ver)
    }

    /// `<data_path>/<dataset>/Train`
    pub fn train_root(&self) -> PathBuf {
        self.data_path.join(&self.dataset).join("Train")
    }

    /// `<data_path>/<dataset>/Test`
    pub fn test_root(&self, dataset: &str) -> PathBuf {
        self.data_path.join(dataset).join("Test")
    }

    /// Directory prediction maps are written to, if enabled
    pub fn map_output_dir(&self) -> Option<PathBuf> {
        self.save_map
            .as_ref()
            .map(|root| root.join(&self.model_name))
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.benchmark_datasets.len(), 5);
        assert_eq!(config.benchmark_datasets[1], "DUT-O");
    }

    #[test]
    fn test_invalid_values() {
        let mut config = RunConfig::default();
        config.aug_ver = 3;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.crop.canvas_size = 320;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(SchedulerKind::parse("Reduce").unwrap(), SchedulerKind::Reduce);
        assert_eq!(SchedulerKind::parse("cos").unwrap(), SchedulerKind::Cosine);
        assert!(SchedulerKind::parse("warmup").is_err());
        assert_eq!(CriterionKind::parse("API").unwrap(), CriterionKind::Structure);
    }

    #[test]
    fn test_paths() {
        let config = RunConfig {
            data_path: PathBuf::from("/data"),
            save_map: Some(PathBuf::from("/out")),
            ..Default::default()
        };
        assert_eq!(config.train_root(), PathBuf::from("/data/DUTS/Train"));
        assert_eq!(config.test_root("ECSSD"), PathBuf::from("/data/ECSSD/Test"));
        assert_eq!(config.map_output_dir(), Some(PathBuf::from("/out/best_model")));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = RunConfig {
            epochs: 7,
            seed: None,
            scheduler: SchedulerKind::Step,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = RunConfig::load(&path).unwrap();
        assert_eq!(loaded.epochs, 7);
        assert_eq!(loaded.seed, None);
        assert_eq!(loaded.scheduler, SchedulerKind::Step);
    }
}
