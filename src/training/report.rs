//! Run report written next to the checkpoints

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::inference::evaluator::BenchmarkResult;
use crate::model::config::RunConfig;
use crate::training::orchestrator::TrainingOutcome;
use crate::utils::error::Result;

/// File name of the report inside `model_path`
pub const REPORT_FILE: &str = "training_report.json";

/// Everything a finished run produced, minus the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// RFC 3339 completion time
    pub timestamp: String,
    pub backend: String,
    pub config: RunConfig,
    pub split_seed: u64,
    pub train_samples: usize,
    pub val_samples: usize,
    pub outcome: TrainingOutcome,
    pub benchmarks: Vec<BenchmarkResult>,
}

impl TrainingReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::orchestrator::{EpochRecord, PhaseSummary, StopReason};
    use tempfile::TempDir;

    #[test]
    fn test_report_round_trip() {
        let dir = TempDir::new().unwrap();
        let summary = PhaseSummary { loss: 1.5, mae: 0.2 };
        let report = TrainingReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            backend: "NdArray (CPU)".to_string(),
            config: RunConfig::default(),
            split_seed: 42,
            train_samples: 8,
            val_samples: 2,
            outcome: TrainingOutcome {
                best_epoch: 1,
                best_loss: 1.5,
                best_mae: 0.2,
                epochs_run: 1,
                stop_reason: StopReason::EpochLimitReached,
                history: vec![EpochRecord {
                    epoch: 1,
                    train: summary,
                    val: summary,
                    learning_rate: 5e-5,
                    improved: true,
                }],
                elapsed_secs: 3.0,
            },
            benchmarks: Vec::new(),
        };

        let path = dir.path().join(REPORT_FILE);
        report.save(&path).unwrap();
        let loaded = TrainingReport::load(&path).unwrap();
        assert_eq!(loaded.split_seed, 42);
        assert_eq!(loaded.outcome.history, report.outcome.history);
        assert_eq!(loaded.outcome.stop_reason, StopReason::EpochLimitReached);
    }
}
