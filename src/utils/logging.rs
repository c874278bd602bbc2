//! Logging setup and the epoch-level training logger

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Subscriber settings chosen by the CLI
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Most verbose level shown
    pub level: Level,
    /// Include the module path of each event
    pub include_target: bool,
    pub include_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
            include_thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Debug level with targets and thread ids, for `--verbose`
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            include_thread_ids: true,
        }
    }
}

/// Install a compact global subscriber; fails if one is already set
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Epoch-level progress logger for the training loop
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (1-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch:[{:03}/{:03}]", epoch, self.total_epochs);
    }

    /// Log end of an epoch with both phase summaries
    pub fn end_epoch(&self, train_loss: f64, train_mae: f64, val_loss: f64, val_mae: f64, lr: f64) {
        let epoch_time = self.epoch_start.elapsed();

        tracing::info!(
            "Epoch {}/{} in {:.1}s | Train Loss: {:.3} | Train MAE: {:.3} | Valid Loss: {:.3} | Valid MAE: {:.3} | LR: {:.2e}",
            self.epoch,
            self.total_epochs,
            epoch_time.as_secs_f64(),
            train_loss,
            train_mae,
            val_loss,
            val_mae,
            lr
        );
    }

    pub fn log_new_best(&self, val_loss: f64) {
        tracing::info!(
            "Saving best weights: epoch {} (val loss {:.4})",
            self.epoch,
            val_loss
        );
    }

    pub fn log_early_stop(&self, epochs_without_improvement: usize) {
        tracing::warn!(
            "Early stopping at epoch {} after {} epochs without improvement",
            self.epoch,
            epochs_without_improvement
        );
    }

    pub fn log_complete(&self, best_epoch: usize, best_loss: f64, best_mae: f64) {
        tracing::info!(
            "Best Val Epoch: {} | Val Loss: {:.3} | Val MAE: {:.3} | time: {:.3}M",
            best_epoch,
            best_loss,
            best_mae,
            self.training_start.elapsed().as_secs_f64() / 60.0
        );
    }

    /// Seconds since the logger was created
    pub fn elapsed_secs(&self) -> f64 {
        self.training_start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_presets() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.include_target);

        let verbose = LogConfig::verbose();
        assert_eq!(verbose.level, Level::DEBUG);
        assert!(verbose.include_thread_ids);
    }

    #[test]
    fn test_training_logger_tracks_epoch() {
        let mut logger = TrainingLogger::new(10);
        logger.start_epoch(3);
        assert_eq!(logger.epoch, 3);
        assert!(logger.elapsed_secs() >= 0.0);
    }
}
