//! Dataset module for saliency triplets
//!
//! This module provides functionality for:
//! - Discovering image/mask/edge folders on disk and pairing them into records
//! - Deterministic train/validation splitting
//! - Synchronized geometric augmentation and per-phase transform chains
//! - Parallel batch loading and Burn batchers

pub mod augmentation;
pub mod burn_dataset;
pub mod dataloader;
pub mod geometric;
pub mod loader;
pub mod split;

// Re-export main types for convenience
pub use augmentation::{AugmentationPipeline, AugmentationVersion};
pub use burn_dataset::{
    SampleSource, TestBatch, TestBatcher, TestItem, TestMeta, TestSource, TripletBatch,
    TripletBatcher, TripletItem, TripletPhase, TripletSource,
};
pub use dataloader::{LoaderConfig, SampleLoader};
pub use geometric::{CropWindow, GeometricDecision, RasterTriplet, SynchronizedAugmentor};
pub use loader::{discover_test_set, discover_triplets, DatasetStats};
pub use split::{DatasetSplits, TestRecord, TripletRecord, TripletSplitter};
