//! Training module
//!
//! This module provides:
//! - The five-term deep-supervision objective
//! - Global gradient-norm clipping
//! - Learning rate schedulers (plateau, step, cosine)
//! - Rolling and best checkpoints
//! - The epoch state machine with early stopping
//! - The Burn trainer that plugs into it, plus the end-to-end run

pub mod checkpoint;
pub mod clipping;
pub mod objective;
pub mod orchestrator;
pub mod report;
pub mod scheduler;
pub mod trainer;

// Re-export main types for convenience
pub use checkpoint::{CheckpointArtifact, CheckpointStore, BEST_MODEL};
pub use clipping::clip_grad_norm;
pub use objective::{composite_loss, Criterion, SaliencyLoss};
pub use orchestrator::{
    EpochDriver, Orchestrator, PhaseSummary, RunPhase, StopReason, TrainingOutcome, TrainingState,
};
pub use report::TrainingReport;
pub use scheduler::LrScheduler;
pub use trainer::{build_loaders, run_training_with, Trainer};

use crate::backend::{default_device, TrainingBackend};
use crate::model::config::RunConfig;
use crate::utils::error::Result;

/// Run training on the compile-time default backend
pub fn run_training(config: &RunConfig, show_progress: bool) -> Result<TrainingReport> {
    run_training_with::<TrainingBackend>(config, default_device(), show_progress)
}
