//! Model checkpointing
//!
//! Two artifacts live in the model directory:
//! - `<epoch>_model_weights`: written after every epoch
//! - `best_model`: overwritten whenever validation loss strictly improves
//!
//! Files are written with Burn's `CompactRecorder`, which appends its own
//! extension to the stem.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use tracing::{debug, info};

use crate::utils::error::{Result, SaliencyError};

/// Stem of the best-so-far checkpoint
pub const BEST_MODEL: &str = "best_model";

/// Extension `CompactRecorder` appends to every stem
pub const RECORD_EXTENSION: &str = "mpk";

/// Which checkpoint to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointArtifact {
    /// Rolling per-epoch weights
    Epoch(usize),
    /// Best validation loss so far
    Best,
}

impl CheckpointArtifact {
    pub fn stem(&self) -> String {
        match self {
            Self::Epoch(epoch) => format!("{}_model_weights", epoch),
            Self::Best => BEST_MODEL.to_string(),
        }
    }
}

/// Reads and writes model weights under one directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the recorder (no extension)
    pub fn stem_path(&self, name: &str) -> PathBuf {
        self.dir.join(strip_extension(name))
    }

    /// Path of the file the recorder actually writes
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.stem_path(name).with_extension(RECORD_EXTENSION)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    /// Write `model` as the given artifact
    pub fn save<B, M>(&self, model: &M, artifact: CheckpointArtifact) -> Result<PathBuf>
    where
        B: Backend,
        M: Module<B>,
    {
        fs::create_dir_all(&self.dir)?;

        let path = self.stem_path(&artifact.stem());
        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .map_err(|e| {
                SaliencyError::Checkpoint(format!("Failed to save {:?}: {:?}", path, e))
            })?;

        match artifact {
            CheckpointArtifact::Best => info!("Best weights saved to {:?}", path),
            CheckpointArtifact::Epoch(epoch) => debug!("Epoch {} weights saved to {:?}", epoch, path),
        }
        Ok(path)
    }

    pub fn save_epoch<B: Backend, M: Module<B>>(&self, model: &M, epoch: usize) -> Result<PathBuf> {
        self.save(model, CheckpointArtifact::Epoch(epoch))
    }

    pub fn save_best<B: Backend, M: Module<B>>(&self, model: &M) -> Result<PathBuf> {
        self.save(model, CheckpointArtifact::Best)
    }

    /// Load weights named `name` into `model`.
    ///
    /// Fails if the file is missing or if the stored parameters do not have
    /// the shapes of `model`.
    pub fn load<B, M>(&self, model: M, name: &str, device: &B::Device) -> Result<M>
    where
        B: Backend,
        M: Module<B>,
    {
        let file = self.file_path(name);
        if !file.is_file() {
            return Err(SaliencyError::Checkpoint(format!(
                "Checkpoint not found: {:?}",
                file
            )));
        }

        let expected = model.num_params();
        let stem = self.stem_path(name);
        // Some record/module mismatches panic inside the recorder
        let loaded = panic::catch_unwind(AssertUnwindSafe(|| {
            model.load_file(stem, &CompactRecorder::new(), device)
        }))
        .map_err(|_| {
            SaliencyError::Checkpoint(format!("Checkpoint {:?} does not fit the model", file))
        })?
        .map_err(|e| SaliencyError::Checkpoint(format!("Failed to load {:?}: {:?}", file, e)))?;

        let found = loaded.num_params();
        if found != expected {
            return Err(SaliencyError::Checkpoint(format!(
                "Checkpoint {:?} holds {} parameters, model expects {}",
                file, found, expected
            )));
        }

        info!("Restored weights from {:?}", file);
        Ok(loaded)
    }
}

/// `best_model.mpk` and `best_model` both name the same checkpoint
fn strip_extension(name: &str) -> &str {
    name.strip_suffix(".mpk").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SaliencyNet, SaliencyNetConfig};
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn tiny_model(base_filters: usize) -> SaliencyNet<TestBackend> {
        SaliencyNetConfig::new()
            .with_base_filters(base_filters)
            .init(&Default::default())
    }

    #[test]
    fn test_artifact_stems() {
        assert_eq!(CheckpointArtifact::Epoch(7).stem(), "7_model_weights");
        assert_eq!(CheckpointArtifact::Best.stem(), "best_model");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let device = Default::default();

        let model = tiny_model(2);
        store.save_epoch(&model, 1).unwrap();
        store.save_best(&model).unwrap();
        assert!(store.exists("1_model_weights"));
        assert!(store.exists(BEST_MODEL));

        let restored = store.load(tiny_model(2), BEST_MODEL, &device).unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let a: f32 = model.forward(input.clone()).mask.mean().into_scalar();
        let b: f32 = restored.forward(input).mask.mean().into_scalar();
        assert!((a - b).abs() < 1e-2);
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let result = store.load(tiny_model(2), BEST_MODEL, &Default::default());
        assert!(matches!(result, Err(SaliencyError::Checkpoint(_))));
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save_best(&tiny_model(4)).unwrap();

        let result = store.load(tiny_model(2), BEST_MODEL, &Default::default());
        assert!(matches!(result, Err(SaliencyError::Checkpoint(_))));
    }

    #[test]
    fn test_name_with_extension() {
        let store = CheckpointStore::new("/tmp/models");
        assert_eq!(store.stem_path("best_model.mpk"), PathBuf::from("/tmp/models/best_model"));
        assert_eq!(store.file_path("best_model"), PathBuf::from("/tmp/models/best_model.mpk"));
    }
}
