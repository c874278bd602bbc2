//! Learning Rate Schedulers
//!
//! Three policies selected by [`SchedulerKind`]:
//! - Reduce: multiply by `lr_factor` when the validation loss plateaus
//! - Step: multiply by `lr_factor` every `step_size` epochs
//! - Cosine: anneal from the initial rate to a floor over the run
//!
//! The trainer calls [`LrScheduler::advance`] once per epoch. Only the
//! plateau policy looks at the metric it is given.

use crate::model::config::{RunConfig, SchedulerKind};

/// Floor for the cosine and plateau policies, relative to the initial rate
const MIN_LR_RATIO: f64 = 1e-2;

/// Learning rate schedule driven once per epoch
#[derive(Debug, Clone)]
pub enum LrScheduler {
    /// Reduce on plateau of a minimized metric
    Reduce(ReduceOnPlateauState),

    /// Multiply by `factor` every `step_size` epochs
    Step {
        initial_lr: f64,
        factor: f64,
        step_size: usize,
        epoch: usize,
        current_lr: f64,
    },

    /// Cosine annealing from `initial_lr` to `min_lr` over `total_epochs`
    Cosine {
        initial_lr: f64,
        min_lr: f64,
        total_epochs: usize,
        epoch: usize,
        current_lr: f64,
    },
}

impl LrScheduler {
    /// Build the scheduler a run configuration asks for
    pub fn from_config(config: &RunConfig) -> Self {
        let lr = config.learning_rate;
        match config.scheduler {
            SchedulerKind::Reduce => Self::Reduce(ReduceOnPlateauState::new(
                lr,
                config.lr_factor,
                config.patience,
                lr * MIN_LR_RATIO,
            )),
            SchedulerKind::Step => Self::step(lr, config.lr_factor, config.step_size),
            SchedulerKind::Cosine => Self::cosine(lr, lr * MIN_LR_RATIO, config.epochs),
        }
    }

    pub fn step(initial_lr: f64, factor: f64, step_size: usize) -> Self {
        Self::Step {
            initial_lr,
            factor,
            step_size: step_size.max(1),
            epoch: 0,
            current_lr: initial_lr,
        }
    }

    pub fn cosine(initial_lr: f64, min_lr: f64, total_epochs: usize) -> Self {
        Self::Cosine {
            initial_lr,
            min_lr,
            total_epochs: total_epochs.max(1),
            epoch: 0,
            current_lr: initial_lr,
        }
    }

    /// Advance one epoch and return the rate for the next one.
    ///
    /// `val_loss` only matters for the plateau policy.
    pub fn advance(&mut self, val_loss: f64) -> f64 {
        match self {
            Self::Reduce(state) => state.step(val_loss),
            Self::Step {
                initial_lr,
                factor,
                step_size,
                epoch,
                current_lr,
            } => {
                *epoch += 1;
                let decays = (*epoch / *step_size) as i32;
                *current_lr = *initial_lr * factor.powi(decays);
                *current_lr
            }
            Self::Cosine {
                initial_lr,
                min_lr,
                total_epochs,
                epoch,
                current_lr,
            } => {
                *epoch = (*epoch + 1).min(*total_epochs);
                let progress = *epoch as f64 / *total_epochs as f64;
                let cosine_factor = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                *current_lr = *min_lr + (*initial_lr - *min_lr) * cosine_factor;
                *current_lr
            }
        }
    }

    /// Rate to use for the current epoch
    pub fn current_lr(&self) -> f64 {
        match self {
            Self::Reduce(state) => state.get_lr(),
            Self::Step { current_lr, .. } | Self::Cosine { current_lr, .. } => *current_lr,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Reduce(state) => format!(
                "Reduce on plateau: lr={:.2e}, factor={}, patience={}",
                state.current_lr, state.reduction_factor, state.patience
            ),
            Self::Step {
                initial_lr,
                factor,
                step_size,
                ..
            } => format!(
                "Step decay: initial={:.2e}, factor={}, every {} epochs",
                initial_lr, factor, step_size
            ),
            Self::Cosine {
                initial_lr,
                min_lr,
                total_epochs,
                ..
            } => format!(
                "Cosine annealing: initial={:.2e}, min={:.2e}, epochs={}",
                initial_lr, min_lr, total_epochs
            ),
        }
    }
}

/// State for the reduce-on-plateau policy (metric is minimized)
#[derive(Debug, Clone)]
pub struct ReduceOnPlateauState {
    best_metric: f64,
    epochs_without_improvement: usize,
    current_lr: f64,
    reduction_factor: f64,
    patience: usize,
    min_lr: f64,
}

impl ReduceOnPlateauState {
    pub fn new(initial_lr: f64, reduction_factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            best_metric: f64::INFINITY,
            epochs_without_improvement: 0,
            current_lr: initial_lr,
            reduction_factor,
            patience,
            min_lr,
        }
    }

    /// Feed a new metric value and return the (possibly reduced) rate
    pub fn step(&mut self, metric: f64) -> f64 {
        if metric < self.best_metric {
            self.best_metric = metric;
            self.epochs_without_improvement = 0;
            return self.current_lr;
        }

        self.epochs_without_improvement += 1;
        if self.epochs_without_improvement > self.patience {
            let new_lr = (self.current_lr * self.reduction_factor).max(self.min_lr);
            if new_lr < self.current_lr {
                self.current_lr = new_lr;
            }
            self.epochs_without_improvement = 0;
        }

        self.current_lr
    }

    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_decay() {
        let mut scheduler = LrScheduler::step(0.1, 0.1, 2);
        assert_eq!(scheduler.current_lr(), 0.1);

        assert!((scheduler.advance(0.0) - 0.1).abs() < 1e-12); // after epoch 1
        assert!((scheduler.advance(0.0) - 0.01).abs() < 1e-12); // after epoch 2
        assert!((scheduler.advance(0.0) - 0.01).abs() < 1e-12);
        assert!((scheduler.advance(0.0) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_reaches_floor() {
        let mut scheduler = LrScheduler::cosine(1.0, 0.01, 4);
        let mut previous = scheduler.current_lr();
        for _ in 0..4 {
            let lr = scheduler.advance(0.0);
            assert!(lr < previous);
            previous = lr;
        }
        assert!((previous - 0.01).abs() < 1e-12);

        // Stays at the floor past the horizon
        assert!((scheduler.advance(0.0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_plateau_reduces_after_patience() {
        let mut state = ReduceOnPlateauState::new(1.0, 0.5, 2, 0.1);

        assert_eq!(state.step(1.0), 1.0);
        assert_eq!(state.step(1.0), 1.0); // 1 bad epoch
        assert_eq!(state.step(1.0), 1.0); // 2 bad epochs
        assert_eq!(state.step(1.0), 0.5); // 3 > patience
        assert_eq!(state.epochs_without_improvement(), 0);

        assert_eq!(state.step(0.5), 0.5);
    }

    #[test]
    fn test_plateau_respects_floor() {
        let mut state = ReduceOnPlateauState::new(0.2, 0.1, 0, 0.1);
        state.step(1.0);
        assert_eq!(state.step(2.0), 0.1);
        assert_eq!(state.step(3.0), 0.1);
    }

    #[test]
    fn test_from_config_picks_policy() {
        let mut config = RunConfig::default();
        config.scheduler = SchedulerKind::Reduce;
        assert!(matches!(LrScheduler::from_config(&config), LrScheduler::Reduce(_)));

        config.scheduler = SchedulerKind::Step;
        let scheduler = LrScheduler::from_config(&config);
        assert!(matches!(scheduler, LrScheduler::Step { .. }));
        assert_eq!(scheduler.current_lr(), config.learning_rate);

        config.scheduler = SchedulerKind::Cosine;
        assert!(scheduler.description().starts_with("Step"));
        assert!(matches!(LrScheduler::from_config(&config), LrScheduler::Cosine { .. }));
    }
}
