//! # Salient Trainer
//!
//! Training, validation and benchmark orchestration for salient object
//! detection networks, built on the Burn framework.
//!
//! ## Features
//!
//! - **Paired data pipeline**: image, mask and edge triplets are split once,
//!   augmented with synchronized geometry and loaded on a worker pool
//! - **Deep supervision**: a five-term objective over the primary mask, three
//!   auxiliary maps and the edge map
//! - **Run control**: plateau/step/cosine schedules, rolling and best
//!   checkpoints, early stopping
//! - **Benchmarking**: MAE, max-F, avg-F and S-measure on DUTS, DUT-O,
//!   HKU-IS, ECSSD and PASCAL-S, with optional map export
//!
//! ## Modules
//!
//! - `dataset`: Discovery, splitting, augmentation and batch loading
//! - `model`: The network contract and a reference network
//! - `training`: Objective, schedulers, checkpoints, epoch loop and trainer
//! - `inference`: Test-set evaluation and map compositing
//! - `utils`: Logging, metrics, telemetry and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use salient_trainer::model::RunConfig;
//! use salient_trainer::training::run_training;
//!
//! let mut config = RunConfig::default();
//! config.data_path = "data".into();
//! config.epochs = 20;
//!
//! let report = run_training(&config, true)?;
//! println!("best epoch: {}", report.outcome.best_epoch);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::split::{DatasetSplits, TripletRecord, TripletSplitter};
pub use dataset::{AugmentationPipeline, SampleLoader, SynchronizedAugmentor};
pub use inference::{BenchmarkResult, Evaluator};
pub use model::config::{RunConfig, BENCHMARK_DATASETS};
pub use model::{SaliencyNet, SaliencyNetwork, SaliencyOutput};
pub use training::{Orchestrator, TrainingOutcome, TrainingReport};
pub use utils::error::{Result, SaliencyError};
pub use utils::metrics::{MetricScores, SaliencyMetrics};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
