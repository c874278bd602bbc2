//! Scalar telemetry sinks.
//!
//! The training loop reports `Loss/train`, `MAE/train`, `Loss/val` and
//! `MAE/val` once per epoch through [`ScalarSink`].

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::Result;

pub const LOSS_TRAIN: &str = "Loss/train";
pub const MAE_TRAIN: &str = "MAE/train";
pub const LOSS_VAL: &str = "Loss/val";
pub const MAE_VAL: &str = "MAE/val";

/// Receives scalar time series keyed by tag and step
pub trait ScalarSink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One line of a scalar log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub step: usize,
    pub value: f64,
}

/// Appends scalars to a JSON-lines file
pub struct JsonlScalarSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlScalarSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        info!("Recording scalars to {:?}", path);

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back a scalar log written by this sink
    pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<ScalarRecord>> {
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}

impl ScalarSink for JsonlScalarSink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            step,
            value,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps scalars in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryScalarSink {
    pub records: Vec<ScalarRecord>,
}

impl MemoryScalarSink {
    /// Values recorded under `tag`, in step order of arrival
    pub fn series(&self, tag: &str) -> Vec<(usize, f64)> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }
}

impl ScalarSink for MemoryScalarSink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.records.push(ScalarRecord {
            tag: tag.to_string(),
            step,
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_sink_writes_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("scalars.jsonl");

        let mut sink = JsonlScalarSink::create(&path).unwrap();
        sink.record_scalar(LOSS_TRAIN, 1.5, 1).unwrap();
        sink.record_scalar(LOSS_VAL, 1.25, 1).unwrap();
        sink.flush().unwrap();

        let records = JsonlScalarSink::read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tag, LOSS_VAL);
        assert_eq!(records[1].value, 1.25);
    }

    #[test]
    fn test_memory_sink_series() {
        let mut sink = MemoryScalarSink::default();
        sink.record_scalar(MAE_VAL, 0.2, 1).unwrap();
        sink.record_scalar(MAE_TRAIN, 0.3, 1).unwrap();
        sink.record_scalar(MAE_VAL, 0.1, 2).unwrap();

        assert_eq!(sink.series(MAE_VAL), vec![(1, 0.2), (2, 0.1)]);
    }
}
