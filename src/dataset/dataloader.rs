//! Parallel batch loading
//!
//! [`SampleLoader`] splits an epoch into index batches and loads each batch
//! on a fixed-size rayon pool. Every sample gets its own RNG, so workers
//! share nothing mutable; results come back in index order. A failed load
//! fails the whole batch.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::dataset::burn_dataset::SampleSource;
use crate::utils::error::{Result, SaliencyError};

/// Batching policy for one loader
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Drop the trailing incomplete batch
    pub drop_last: bool,
    /// Worker threads; 0 loads on the calling thread
    pub num_workers: usize,
    /// Seed for the per-epoch shuffle
    pub seed: u64,
    /// Seed for per-sample augmentation; entropy when absent
    pub aug_seed: Option<u64>,
}

impl LoaderConfig {
    /// Shuffled, incomplete batches dropped
    pub fn train(batch_size: usize, num_workers: usize, seed: u64) -> Self {
        Self {
            batch_size,
            shuffle: true,
            drop_last: true,
            num_workers,
            seed,
            aug_seed: None,
        }
    }

    /// Sequential, incomplete batches dropped
    pub fn val(batch_size: usize, num_workers: usize, seed: u64) -> Self {
        Self {
            shuffle: false,
            ..Self::train(batch_size, num_workers, seed)
        }
    }

    /// Sequential, every sample kept
    pub fn test(batch_size: usize, num_workers: usize) -> Self {
        Self {
            shuffle: false,
            drop_last: false,
            ..Self::train(batch_size, num_workers, 0)
        }
    }

    pub fn with_aug_seed(mut self, aug_seed: Option<u64>) -> Self {
        self.aug_seed = aug_seed;
        self
    }
}

/// Loads batches of samples from a [`SampleSource`]
pub struct SampleLoader<S: SampleSource> {
    source: Arc<S>,
    config: LoaderConfig,
    pool: Option<ThreadPool>,
}

impl<S: SampleSource> SampleLoader<S> {
    pub fn new(source: S, config: LoaderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(SaliencyError::Configuration(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        let pool = if config.num_workers > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .thread_name(|i| format!("sample-loader-{}", i))
                .build()
                .map_err(|e| {
                    SaliencyError::Configuration(format!("failed to start loader workers: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            source: Arc::new(source),
            config,
            pool,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Number of samples in the underlying source
    pub fn num_samples(&self) -> usize {
        self.source.len()
    }

    /// Number of batches one epoch yields
    pub fn num_batches(&self) -> usize {
        let n = self.source.len();
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            n.div_ceil(self.config.batch_size)
        }
    }

    /// Index batches for `epoch`, shuffled if configured
    pub fn batch_indices(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.source.len()).collect();
        if self.config.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }

        indices
            .chunks(self.config.batch_size)
            .filter(|chunk| !self.config.drop_last || chunk.len() == self.config.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Iterate the batches of one epoch
    pub fn iter(&self, epoch: usize) -> EpochBatches<'_, S> {
        EpochBatches {
            loader: self,
            epoch,
            batches: self.batch_indices(epoch).into_iter(),
        }
    }

    /// Load one batch; items come back in the order of `indices`
    pub fn load_batch(&self, indices: &[usize], epoch: usize) -> Result<Vec<S::Item>> {
        let load = |index: usize| {
            let mut rng = self.sample_rng(epoch, index);
            self.source.load(index, &mut rng)
        };

        match &self.pool {
            Some(pool) => pool.install(|| indices.par_iter().map(|&i| load(i)).collect()),
            None => indices.iter().map(|&i| load(i)).collect(),
        }
    }

    fn sample_rng(&self, epoch: usize, index: usize) -> ChaCha8Rng {
        match self.config.aug_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(mix_seed(seed, epoch as u64, index as u64)),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

/// Derive an independent stream seed per (epoch, sample)
fn mix_seed(seed: u64, epoch: u64, index: u64) -> u64 {
    let mut z = seed
        ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ index.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Batches of one epoch, loaded lazily
pub struct EpochBatches<'a, S: SampleSource> {
    loader: &'a SampleLoader<S>,
    epoch: usize,
    batches: std::vec::IntoIter<Vec<usize>>,
}

impl<S: SampleSource> Iterator for EpochBatches<'_, S> {
    type Item = Result<Vec<S::Item>>;

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.batches.next()?;
        debug!("Loading batch of {} samples (epoch {})", indices.len(), self.epoch);
        Some(self.loader.load_batch(&indices, self.epoch))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.batches.size_hint()
    }
}

impl<S: SampleSource> ExactSizeIterator for EpochBatches<'_, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::path::PathBuf;

    /// Returns `(index, random draw)`; fails on `fail_at`
    struct CountingSource {
        len: usize,
        fail_at: Option<usize>,
    }

    impl SampleSource for CountingSource {
        type Item = (usize, u32);

        fn len(&self) -> usize {
            self.len
        }

        fn load(&self, index: usize, rng: &mut ChaCha8Rng) -> Result<(usize, u32)> {
            if Some(index) == self.fail_at {
                return Err(SaliencyError::MissingFile(
                    PathBuf::from(format!("{}.jpg", index)),
                    "not found".to_string(),
                ));
            }
            Ok((index, rng.gen()))
        }
    }

    fn source(len: usize) -> CountingSource {
        CountingSource { len, fail_at: None }
    }

    #[test]
    fn test_sequential_batches_drop_last() {
        let loader = SampleLoader::new(source(10), LoaderConfig::val(4, 0, 0)).unwrap();
        assert_eq!(loader.num_batches(), 2);
        assert_eq!(loader.batch_indices(0), vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);
    }

    #[test]
    fn test_test_loader_keeps_incomplete_batch() {
        let loader = SampleLoader::new(source(10), LoaderConfig::test(4, 2)).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<_> = loader.iter(0).map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![8, 9]);
    }

    #[test]
    fn test_shuffle_is_reproducible_per_epoch() {
        let loader = SampleLoader::new(source(32), LoaderConfig::train(4, 0, 42)).unwrap();
        assert_eq!(loader.batch_indices(3), loader.batch_indices(3));
        assert_ne!(loader.batch_indices(1), loader.batch_indices(2));

        let mut seen: Vec<usize> = loader.batch_indices(1).into_iter().flatten().collect();
        seen.sort();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_load_preserves_order() {
        let config = LoaderConfig::test(16, 4).with_aug_seed(Some(9));
        let parallel = SampleLoader::new(source(16), config.clone()).unwrap();
        let serial = SampleLoader::new(
            source(16),
            LoaderConfig {
                num_workers: 0,
                ..config
            },
        )
        .unwrap();

        let a = parallel.load_batch(&(0..16).collect::<Vec<_>>(), 0).unwrap();
        let b = serial.load_batch(&(0..16).collect::<Vec<_>>(), 0).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().enumerate().all(|(i, (idx, _))| i == *idx));
    }

    #[test]
    fn test_aug_seed_varies_by_epoch() {
        let loader =
            SampleLoader::new(source(4), LoaderConfig::test(4, 0).with_aug_seed(Some(1))).unwrap();
        let first = loader.load_batch(&[0, 1], 0).unwrap();
        let again = loader.load_batch(&[0, 1], 0).unwrap();
        let next_epoch = loader.load_batch(&[0, 1], 1).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, next_epoch);
    }

    #[test]
    fn test_failed_sample_fails_batch() {
        let loader = SampleLoader::new(
            CountingSource {
                len: 8,
                fail_at: Some(5),
            },
            LoaderConfig::test(4, 2),
        )
        .unwrap();

        let results: Vec<_> = loader.iter(0).collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SaliencyError::MissingFile(_, _))));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(SampleLoader::new(source(4), LoaderConfig::test(0, 0)).is_err());
    }
}
