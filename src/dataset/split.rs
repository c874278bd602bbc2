//! Deterministic train/validation split of image/mask/edge triplets
//!
//! Records are paired once from filename-sorted listings, then a seeded
//! ChaCha8 permutation assigns `ceil(val_ratio * n)` of them to validation
//! and the rest to training. The same records and seed always give the same
//! partitions, so the training and validation loaders can be built
//! independently without overlapping.
//!
//! The test phase does not split: every image is kept in sorted order and
//! ground truth may be absent.

use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::error::{Result, SaliencyError};

/// One aligned training sample on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripletRecord {
    pub image: PathBuf,
    pub mask: PathBuf,
    pub edge: PathBuf,
}

impl TripletRecord {
    /// Sample name (image file stem)
    pub fn name(&self) -> String {
        file_stem(&self.image)
    }
}

/// One test image with optional ground truth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub image: PathBuf,
    pub gt: Option<PathBuf>,
}

impl TestRecord {
    pub fn name(&self) -> String {
        file_stem(&self.image)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Zip three sorted listings into records.
///
/// Fails with a configuration error when the listings differ in length.
pub fn pair_triplets(
    images: Vec<PathBuf>,
    masks: Vec<PathBuf>,
    edges: Vec<PathBuf>,
) -> Result<Vec<TripletRecord>> {
    if images.len() != masks.len() || images.len() != edges.len() {
        return Err(SaliencyError::Configuration(format!(
            "file counts differ: {} images, {} masks, {} edges",
            images.len(),
            masks.len(),
            edges.len()
        )));
    }

    let records: Vec<TripletRecord> = images
        .into_iter()
        .zip(masks)
        .zip(edges)
        .map(|((image, mask), edge)| TripletRecord { image, mask, edge })
        .collect();

    let mismatched = records
        .iter()
        .filter(|r| file_stem(&r.mask) != r.name() || file_stem(&r.edge) != r.name())
        .count();
    if mismatched > 0 {
        warn!(
            "{} triplets pair files with different stems; pairing follows sort order",
            mismatched
        );
    }

    Ok(records)
}

/// Pair test images with optional ground-truth masks
pub fn pair_test_records(
    images: Vec<PathBuf>,
    masks: Option<Vec<PathBuf>>,
) -> Result<Vec<TestRecord>> {
    match masks {
        None => Ok(images
            .into_iter()
            .map(|image| TestRecord { image, gt: None })
            .collect()),
        Some(masks) => {
            if masks.len() != images.len() {
                return Err(SaliencyError::Configuration(format!(
                    "file counts differ: {} test images, {} masks",
                    images.len(),
                    masks.len()
                )));
            }
            Ok(images
                .into_iter()
                .zip(masks)
                .map(|(image, gt)| TestRecord {
                    image,
                    gt: Some(gt),
                })
                .collect())
        }
    }
}

/// Seeded train/validation splitter
#[derive(Debug, Clone, Copy)]
pub struct TripletSplitter {
    seed: u64,
    val_ratio: f64,
}

impl TripletSplitter {
    pub fn new(seed: u64, val_ratio: f64) -> Result<Self> {
        if !(val_ratio > 0.0 && val_ratio < 1.0) {
            return Err(SaliencyError::Configuration(
                "validation ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(Self { seed, val_ratio })
    }

    /// Resolve an optional seed, drawing and logging one when absent
    pub fn resolve_seed(seed: Option<u64>) -> u64 {
        match seed {
            Some(seed) => seed,
            None => {
                let seed = rand::thread_rng().gen();
                info!("No split seed configured, using {}", seed);
                seed
            }
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of validation records for `n` records
    pub fn val_len(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let raw = (n as f64 * self.val_ratio - 1e-9).ceil() as usize;
        raw.clamp(1, n)
    }

    /// Split paired records into train and validation partitions
    pub fn split(&self, records: &[TripletRecord]) -> DatasetSplits {
        let mut indices: Vec<usize> = (0..records.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let n_val = self.val_len(records.len());
        let (val_idx, train_idx) = indices.split_at(n_val);

        let splits = DatasetSplits {
            seed: self.seed,
            train: train_idx.iter().map(|&i| records[i].clone()).collect(),
            val: val_idx.iter().map(|&i| records[i].clone()).collect(),
        };

        info!(
            "Split {} triplets into {} train / {} val (seed {})",
            records.len(),
            splits.train.len(),
            splits.val.len(),
            self.seed
        );

        splits
    }

    /// Pair three listings and split them
    pub fn split_lists(
        &self,
        images: Vec<PathBuf>,
        masks: Vec<PathBuf>,
        edges: Vec<PathBuf>,
    ) -> Result<DatasetSplits> {
        let records = pair_triplets(images, masks, edges)?;
        Ok(self.split(&records))
    }
}

/// Train and validation partitions of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub seed: u64,
    pub train: Vec<TripletRecord>,
    pub val: Vec<TripletRecord>,
}

impl DatasetSplits {
    pub fn total(&self) -> usize {
        self.train.len() + self.val.len()
    }

    /// Save the partitions to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load partitions from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl std::fmt::Display for DatasetSplits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.total().max(1) as f64;
        writeln!(f, "Dataset split (seed {}):", self.seed)?;
        writeln!(
            f,
            "  Train: {:>6} ({:.1}%)",
            self.train.len(),
            100.0 * self.train.len() as f64 / total
        )?;
        write!(
            f,
            "  Val:   {:>6} ({:.1}%)",
            self.val.len(),
            100.0 * self.val.len() as f64 / total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn listings(n: usize) -> (Vec<PathBuf>, Vec<PathBuf>, Vec<PathBuf>) {
        let make = |dir: &str, ext: &str| {
            (0..n)
                .map(|i| PathBuf::from(format!("{}/{:04}.{}", dir, i, ext)))
                .collect::<Vec<_>>()
        };
        (make("images", "jpg"), make("masks", "png"), make("edges", "png"))
    }

    #[test]
    fn test_ten_triplets_seed_42() {
        let (images, masks, edges) = listings(10);
        let splitter = TripletSplitter::new(42, 0.2).unwrap();

        let first = splitter
            .split_lists(images.clone(), masks.clone(), edges.clone())
            .unwrap();
        assert_eq!(first.train.len(), 8);
        assert_eq!(first.val.len(), 2);

        let second = splitter.split_lists(images, masks, edges).unwrap();
        let names = |s: &DatasetSplits| s.val.iter().map(|r| r.name()).collect::<Vec<_>>();
        assert_eq!(names(&first), names(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let (images, masks, edges) = listings(37);
        let splits = TripletSplitter::new(7, 0.2)
            .unwrap()
            .split_lists(images, masks, edges)
            .unwrap();

        let train: HashSet<_> = splits.train.iter().map(|r| r.name()).collect();
        let val: HashSet<_> = splits.val.iter().map(|r| r.name()).collect();
        assert!(train.is_disjoint(&val));
        assert_eq!(train.len() + val.len(), 37);
    }

    #[test]
    fn test_ratio_for_various_lengths() {
        let splitter = TripletSplitter::new(1, 0.2).unwrap();
        for n in 5..60 {
            let n_val = splitter.val_len(n);
            let expected = 0.2 * n as f64;
            assert!((n_val as f64 - expected).abs() < 1.0, "n={} val={}", n, n_val);
        }
    }

    #[test]
    fn test_records_stay_aligned() {
        let (images, masks, edges) = listings(12);
        let splits = TripletSplitter::new(3, 0.2)
            .unwrap()
            .split_lists(images, masks, edges)
            .unwrap();

        for record in splits.train.iter().chain(&splits.val) {
            assert_eq!(file_stem(&record.mask), record.name());
            assert_eq!(file_stem(&record.edge), record.name());
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let (images, masks, edges) = listings(50);
        let records = pair_triplets(images, masks, edges).unwrap();
        let a = TripletSplitter::new(1, 0.2).unwrap().split(&records);
        let b = TripletSplitter::new(2, 0.2).unwrap().split(&records);
        assert_ne!(a.val, b.val);
    }

    #[test]
    fn test_count_mismatch_is_configuration_error() {
        let (images, masks, mut edges) = listings(5);
        edges.pop();
        let result = TripletSplitter::new(42, 0.2)
            .unwrap()
            .split_lists(images, masks, edges);
        assert!(matches!(result, Err(SaliencyError::Configuration(_))));
    }

    #[test]
    fn test_test_records_keep_order() {
        let (images, masks, _) = listings(3);
        let records = pair_test_records(images.clone(), Some(masks)).unwrap();
        assert_eq!(records[1].image, images[1]);
        assert!(records[1].gt.is_some());

        let no_gt = pair_test_records(images, None).unwrap();
        assert!(no_gt[0].gt.is_none());
    }

    #[test]
    fn test_save_and_load_splits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("split.json");
        let (images, masks, edges) = listings(10);
        let splits = TripletSplitter::new(42, 0.2)
            .unwrap()
            .split_lists(images, masks, edges)
            .unwrap();

        splits.save(&path).unwrap();
        let loaded = DatasetSplits::load(&path).unwrap();
        assert_eq!(splits, loaded);
        assert!(loaded.to_string().contains("seed 42"));
    }
}
