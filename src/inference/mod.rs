//! Inference module for benchmark evaluation and map export
//!
//! This module provides:
//! - Per-dataset scoring (loss, MAE, max-F, avg-F, S-measure)
//! - Prediction maps resized to the source resolution
//! - Compositing of maps over a background image

pub mod evaluator;
pub mod postprocess;

// Re-export main types for convenience
pub use evaluator::{format_benchmark_table, BenchmarkResult, Evaluator};
pub use postprocess::{compose_over_background, map_to_luma, tensor_to_map, Foreground};
