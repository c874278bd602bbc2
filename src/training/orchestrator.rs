//! Epoch state machine
//!
//! [`Orchestrator`] owns the control flow of a run: train, validate, report
//! scalars, step the scheduler, write checkpoints, decide whether to stop.
//! The numeric work sits behind [`EpochDriver`], so the loop itself has no
//! dependency on a backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::training::checkpoint::CheckpointArtifact;
use crate::utils::error::Result;
use crate::utils::logging::TrainingLogger;
use crate::utils::telemetry::{ScalarSink, LOSS_TRAIN, LOSS_VAL, MAE_TRAIN, MAE_VAL};

/// Validation loss a run starts from; any real loss improves on it
pub const INITIAL_BEST_LOSS: f64 = 1000.0;

/// Extra epochs of grace on top of `patience` before stopping
pub const EARLY_STOP_GRACE: usize = 5;

/// Phases a run goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    Initializing,
    Training,
    Validating,
    CheckpointEvaluation,
    FinalBenchmark,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Training => "training",
            Self::Validating => "validating",
            Self::CheckpointEvaluation => "checkpoint-evaluation",
            Self::FinalBenchmark => "final-benchmark",
            Self::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Why the epoch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    EarlyStopped,
    EpochLimitReached,
}

/// Averages over one pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub loss: f64,
    pub mae: f64,
}

/// One epoch of history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train: PhaseSummary,
    pub val: PhaseSummary,
    pub learning_rate: f64,
    pub improved: bool,
}

/// The per-epoch work the loop delegates
pub trait EpochDriver {
    /// Run one training pass (1-based epoch)
    fn train_epoch(&mut self, epoch: usize) -> Result<PhaseSummary>;

    /// Run one validation pass without gradients
    fn validate_epoch(&mut self, epoch: usize) -> Result<PhaseSummary>;

    /// Advance the learning rate schedule after validation
    fn step_scheduler(&mut self, val_loss: f64);

    /// Persist the current weights
    fn save_checkpoint(&mut self, artifact: CheckpointArtifact) -> Result<()>;

    /// Rate used by the next training pass
    fn learning_rate(&self) -> f64;
}

/// Best-so-far tracking and the early-stop counter
#[derive(Debug, Clone)]
pub struct TrainingState {
    pub phase: RunPhase,
    pub epoch: usize,
    pub best_loss: f64,
    pub best_epoch: usize,
    pub best_mae: f64,
    pub early_stop_counter: usize,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Initializing,
            epoch: 0,
            best_loss: INITIAL_BEST_LOSS,
            best_epoch: 0,
            best_mae: 0.0,
            early_stop_counter: 0,
        }
    }
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the validation result of `epoch`; true on strict improvement
    pub fn record(&mut self, epoch: usize, val_loss: f64, val_mae: f64) -> bool {
        self.epoch = epoch;
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.best_epoch = epoch;
            self.best_mae = val_mae;
            self.early_stop_counter = 0;
            true
        } else {
            self.early_stop_counter += 1;
            false
        }
    }

    pub fn should_stop(&self, patience: usize) -> bool {
        self.early_stop_counter == patience + EARLY_STOP_GRACE
    }

    /// At least one epoch produced a best checkpoint
    pub fn has_best(&self) -> bool {
        self.best_epoch > 0
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(epoch = self.epoch, "Phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}

/// Result of the epoch loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub best_epoch: usize,
    pub best_loss: f64,
    pub best_mae: f64,
    pub epochs_run: usize,
    pub stop_reason: StopReason,
    pub history: Vec<EpochRecord>,
    pub elapsed_secs: f64,
}

impl TrainingOutcome {
    /// Whether `best_model` was written at least once
    pub fn has_best(&self) -> bool {
        self.best_epoch > 0
    }

    pub fn train_losses(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.train.loss).collect()
    }

    pub fn val_losses(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.val.loss).collect()
    }

    pub fn train_maes(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.train.mae).collect()
    }

    pub fn val_maes(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.val.mae).collect()
    }
}

/// Drives epochs until early stop or the epoch limit
#[derive(Debug, Clone)]
pub struct Orchestrator {
    epochs: usize,
    patience: usize,
}

impl Orchestrator {
    pub fn new(epochs: usize, patience: usize) -> Self {
        Self { epochs, patience }
    }

    /// Epoch at which a run improving last at `epoch` stops
    pub fn stop_epoch_after(&self, epoch: usize) -> usize {
        epoch + self.patience + EARLY_STOP_GRACE
    }

    pub fn run<D, S>(&self, driver: &mut D, sink: &mut S) -> Result<TrainingOutcome>
    where
        D: EpochDriver,
        S: ScalarSink + ?Sized,
    {
        let mut state = TrainingState::new();
        let mut logger = TrainingLogger::new(self.epochs);
        let mut history = Vec::with_capacity(self.epochs);
        let mut stop_reason = StopReason::EpochLimitReached;

        for epoch in 1..=self.epochs {
            logger.start_epoch(epoch);
            let learning_rate = driver.learning_rate();

            state.enter(RunPhase::Training);
            let train = driver.train_epoch(epoch)?;

            state.enter(RunPhase::Validating);
            let val = driver.validate_epoch(epoch)?;

            sink.record_scalar(LOSS_TRAIN, train.loss, epoch)?;
            sink.record_scalar(MAE_TRAIN, train.mae, epoch)?;
            sink.record_scalar(LOSS_VAL, val.loss, epoch)?;
            sink.record_scalar(MAE_VAL, val.mae, epoch)?;

            driver.step_scheduler(val.loss);

            state.enter(RunPhase::CheckpointEvaluation);
            driver.save_checkpoint(CheckpointArtifact::Epoch(epoch))?;

            let improved = state.record(epoch, val.loss, val.mae);
            if improved {
                driver.save_checkpoint(CheckpointArtifact::Best)?;
                logger.log_new_best(val.loss);
            }

            logger.end_epoch(train.loss, train.mae, val.loss, val.mae, learning_rate);
            history.push(EpochRecord {
                epoch,
                train,
                val,
                learning_rate,
                improved,
            });

            if state.should_stop(self.patience) {
                logger.log_early_stop(state.early_stop_counter);
                stop_reason = StopReason::EarlyStopped;
                break;
            }
        }

        sink.flush()?;
        logger.log_complete(state.best_epoch, state.best_loss, state.best_mae);

        Ok(TrainingOutcome {
            best_epoch: state.best_epoch,
            best_loss: state.best_loss,
            best_mae: state.best_mae,
            epochs_run: history.len(),
            stop_reason,
            history,
            elapsed_secs: logger.elapsed_secs(),
        })
    }
}
