//! Test-set evaluation
//!
//! Runs a trained network over `<data_path>/<dataset>/Test/images`,
//! resizes every prediction back to its source resolution, scores it
//! against the ground truth and optionally writes the map composited
//! over a background image.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::augmentation::{binarize_ground_truth, AugmentationPipeline, AugmentationVersion};
use crate::dataset::burn_dataset::{read_gray, read_rgb, TestBatch, TestBatcher, TestMeta, TestSource};
use crate::dataset::dataloader::{LoaderConfig, SampleLoader};
use crate::dataset::loader::discover_test_set;
use crate::inference::postprocess::{
    attach_alpha, compose_over_background, map_to_luma, tensor_to_map, Foreground,
};
use crate::model::config::RunConfig;
use crate::model::{resize_maps, SaliencyNetwork};
use crate::training::checkpoint::CheckpointStore;
use crate::training::objective::{Criterion, SaliencyLoss};
use crate::utils::error::{Result, SaliencyError};
use crate::utils::meter::AvgMeter;
use crate::utils::metrics::{MetricScores, SaliencyMetrics};
use crate::utils::progress::pass_bar;

/// Averaged scores for one test set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub dataset: String,
    pub samples: usize,
    /// Absent when the set has no ground truth
    pub loss: Option<f64>,
    pub scores: Option<MetricScores>,
    pub elapsed_secs: f64,
}

impl BenchmarkResult {
    pub fn summary(&self) -> String {
        match (self.loss, self.scores) {
            (Some(loss), Some(s)) => format!(
                "{}: Test Loss:{:.4} | MAX_F:{:.4} | AVG_F:{:.4} | MAE:{:.4} | S_Measure:{:.4}, time: {:.3}s",
                self.dataset, loss, s.max_f, s.avg_f, s.mae, s.s_measure, self.elapsed_secs
            ),
            _ => format!(
                "{}: {} maps written (no ground truth), time: {:.3}s",
                self.dataset, self.samples, self.elapsed_secs
            ),
        }
    }
}

/// Render results as a fixed-width table
pub fn format_benchmark_table(results: &[BenchmarkResult]) -> String {
    let mut out = format!(
        "{:<10} {:>7} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
        "Dataset", "Images", "Loss", "MAE", "maxF", "avgF", "S-m"
    );
    out.push_str(&"-".repeat(63));
    out.push('\n');

    for r in results {
        let cell = |v: Option<f64>| v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<10} {:>7} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
            r.dataset,
            r.samples,
            cell(r.loss),
            cell(r.scores.map(|s| s.mae)),
            cell(r.scores.map(|s| s.max_f)),
            cell(r.scores.map(|s| s.avg_f)),
            cell(r.scores.map(|s| s.s_measure)),
        ));
    }
    out
}

#[derive(Default)]
struct ScoreMeters {
    loss: AvgMeter,
    mae: AvgMeter,
    max_f: AvgMeter,
    avg_f: AvgMeter,
    s_measure: AvgMeter,
}

impl ScoreMeters {
    fn update(&mut self, loss: f64, scores: MetricScores) {
        self.loss.update(loss, 1);
        self.mae.update(scores.mae, 1);
        self.max_f.update(scores.max_f, 1);
        self.avg_f.update(scores.avg_f, 1);
        self.s_measure.update(scores.s_measure, 1);
    }

    fn finish(&self) -> (Option<f64>, Option<MetricScores>) {
        if self.loss.count() == 0 {
            return (None, None);
        }
        let scores = MetricScores {
            mae: self.mae.avg(),
            max_f: self.max_f.avg(),
            avg_f: self.avg_f.avg(),
            s_measure: self.s_measure.avg(),
        };
        (Some(self.loss.avg()), Some(scores))
    }
}

/// Scores a network on benchmark test sets
pub struct Evaluator<B: Backend, M: SaliencyNetwork<B>> {
    model: M,
    criterion: SaliencyLoss,
    metrics: SaliencyMetrics,
    pipeline: AugmentationPipeline,
    data_path: PathBuf,
    batch_size: usize,
    num_workers: usize,
    have_gt: bool,
    output_dir: Option<PathBuf>,
    background: Option<RgbImage>,
    show_progress: bool,
    device: B::Device,
}

impl<B: Backend, M: SaliencyNetwork<B>> Evaluator<B, M> {
    /// Wrap an already-loaded model
    pub fn new(model: M, config: &RunConfig, device: B::Device) -> Result<Self> {
        let output_dir = config.map_output_dir();
        let background = match (&output_dir, &config.background) {
            (Some(_), Some(path)) => load_background(path),
            _ => None,
        };

        Ok(Self {
            model,
            criterion: SaliencyLoss::new(config.criterion),
            metrics: SaliencyMetrics::default(),
            // Test preprocessing never randomizes, the version is irrelevant
            pipeline: AugmentationPipeline::new(AugmentationVersion::V1, config.img_size),
            data_path: config.data_path.clone(),
            batch_size: config.batch_size,
            num_workers: config.num_workers,
            have_gt: config.have_gt,
            output_dir,
            background,
            show_progress: false,
            device,
        })
    }

    /// Load `config.model_name` from `config.model_path` into `model`
    pub fn from_checkpoint(model: M, config: &RunConfig, device: B::Device) -> Result<Self> {
        let store = CheckpointStore::new(&config.model_path);
        let model = store.load(model, &config.model_name, &device)?;
        info!("Pre-trained model restored from {:?}", store.file_path(&config.model_name));
        Self::new(model, config, device)
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_ground_truth(mut self, have_gt: bool) -> Self {
        self.have_gt = have_gt;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Evaluate every image of one benchmark dataset
    pub fn evaluate_dataset(&self, dataset: &str) -> Result<BenchmarkResult> {
        let start = Instant::now();
        let root = self.data_path.join(dataset).join("Test");
        let records = discover_test_set(&root, self.have_gt)?;
        let samples = records.len();

        let loader = SampleLoader::new(
            TestSource::new(records, self.pipeline.clone()),
            LoaderConfig::test(self.batch_size, self.num_workers),
        )?;

        if let Some(dir) = &self.output_dir {
            fs::create_dir_all(dir)?;
        }

        let mut meters = ScoreMeters::default();
        let bar = pass_bar(loader.num_batches(), dataset, self.show_progress);

        for items in loader.iter(0) {
            let batch: TestBatch<B> = TestBatcher.batch(items?, &self.device);
            let output = self.model.forward(batch.images);

            for (i, meta) in batch.meta.iter().enumerate() {
                let (height, width) = meta.original_size;
                let pred = resize_maps(
                    output.mask.clone().narrow(0, i, 1),
                    height as usize,
                    width as usize,
                );
                self.score_sample(pred, meta, &mut meters)?;
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        let (loss, scores) = meters.finish();
        let result = BenchmarkResult {
            dataset: dataset.to_string(),
            samples,
            loss,
            scores,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!("{}", result.summary());
        Ok(result)
    }

    /// Evaluate several datasets, skipping those without a test folder or
    /// whose evaluation fails
    pub fn evaluate_all(&self, datasets: &[String]) -> Result<Vec<BenchmarkResult>> {
        let mut results = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            let images = self.data_path.join(dataset).join("Test").join("images");
            if !images.is_dir() {
                warn!("Skipping {}: {:?} not found", dataset, images);
                continue;
            }
            match self.evaluate_dataset(dataset) {
                Ok(result) => results.push(result),
                Err(e) => warn!("Skipping {}: {}", dataset, e),
            }
        }
        Ok(results)
    }

    fn score_sample(&self, pred: Tensor<B, 4>, meta: &TestMeta, meters: &mut ScoreMeters) -> Result<()> {
        let (values, height, width) = tensor_to_map(pred.clone())?;

        if let Some(dir) = &self.output_dir {
            self.save_map(&values, meta, dir)?;
        }

        let Some(gt_path) = meta.gt_path.as_ref().filter(|_| self.have_gt) else {
            return Ok(());
        };

        let gt = read_gray(gt_path)?;
        let gt = if gt.dimensions() != (width as u32, height as u32) {
            debug!("Resizing ground truth of '{}' to {}x{}", meta.name, width, height);
            imageops::resize(&gt, width as u32, height as u32, FilterType::Triangle)
        } else {
            gt
        };
        let gt_values = binarize_ground_truth(&gt);

        let target = Tensor::<B, 4>::from_data(
            TensorData::new(gt_values.clone(), [1, 1, height, width]),
            &self.device,
        );
        let loss: f64 = self.criterion.loss(pred, target).into_scalar().elem();
        let scores = self.metrics.evaluate(&values, &gt_values, height, width)?;

        meters.update(loss, scores);
        Ok(())
    }

    fn save_map(&self, values: &[f32], meta: &TestMeta, dir: &Path) -> Result<()> {
        let (height, width) = meta.original_size;
        let map = map_to_luma(values, width, height)?;

        let foreground = if self.have_gt {
            Foreground::Luma(map)
        } else {
            let original = read_rgb(&meta.image_path)?;
            Foreground::Rgba(attach_alpha(&original, &map)?)
        };

        let composed = compose_over_background(&foreground, self.background.as_ref(), width, height)?;
        let path = dir.join(format!("{}.png", meta.name));
        composed
            .save(&path)
            .map_err(|e| SaliencyError::ImageWrite(path.clone(), e.to_string()))?;
        Ok(())
    }
}

fn load_background(path: &Path) -> Option<RgbImage> {
    match read_rgb(path) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!("Background unavailable ({}), compositing over black", e);
            None
        }
    }
}
