//! Burn training pipeline for saliency networks
//!
//! This module implements:
//! - The training pass: forward, five-term loss, backward, global
//!   gradient-norm clipping, Adam step
//! - The validation pass on the inner (non-autodiff) model
//! - [`EpochDriver`] for the orchestrator
//! - [`run_training_with`]: data discovery, split, loop, plots, report and
//!   the final benchmark

use std::fs;
use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::{debug, info, warn};

use crate::dataset::augmentation::AugmentationPipeline;
use crate::dataset::burn_dataset::{TripletBatch, TripletBatcher, TripletPhase, TripletSource};
use crate::dataset::dataloader::{LoaderConfig, SampleLoader};
use crate::dataset::geometric::SynchronizedAugmentor;
use crate::dataset::loader::discover_triplets;
use crate::dataset::split::{DatasetSplits, TripletSplitter};
use crate::inference::evaluator::{format_benchmark_table, BenchmarkResult, Evaluator};
use crate::model::config::RunConfig;
use crate::model::{SaliencyNet, SaliencyNetConfig, SaliencyNetwork};
use crate::training::checkpoint::{CheckpointArtifact, CheckpointStore, BEST_MODEL};
use crate::training::clipping::clip_grad_norm;
use crate::training::objective::{batch_mae, composite_loss, SaliencyLoss};
use crate::training::orchestrator::{EpochDriver, Orchestrator, PhaseSummary, RunPhase};
use crate::training::report::{TrainingReport, REPORT_FILE};
use crate::training::scheduler::LrScheduler;
use crate::utils::charts::save_training_curve;
use crate::utils::error::{Result, SaliencyError};
use crate::utils::meter::AvgMeter;
use crate::utils::progress::pass_bar;
use crate::utils::telemetry::JsonlScalarSink;

/// Batches between debug lines
const LOG_EVERY: usize = 10;

pub const CONFIG_FILE: &str = "config.json";
pub const SPLITS_FILE: &str = "splits.json";
pub const SCALARS_FILE: &str = "scalars.jsonl";
pub const PLOTS_DIR: &str = "plots";

/// Owns the model, optimizer, scheduler and loaders of one run
pub struct Trainer<B, M, O>
where
    B: AutodiffBackend,
    M: SaliencyNetwork<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optimizer: O,
    criterion: SaliencyLoss,
    scheduler: LrScheduler,
    clipping: f64,
    train_loader: SampleLoader<TripletSource>,
    val_loader: SampleLoader<TripletSource>,
    checkpoints: CheckpointStore,
    show_progress: bool,
    device: B::Device,
}

impl<B, M, O> Trainer<B, M, O>
where
    B: AutodiffBackend,
    M: SaliencyNetwork<B> + AutodiffModule<B>,
    <M as AutodiffModule<B>>::InnerModule: SaliencyNetwork<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    pub fn new(
        model: M,
        optimizer: O,
        config: &RunConfig,
        train_loader: SampleLoader<TripletSource>,
        val_loader: SampleLoader<TripletSource>,
        device: B::Device,
    ) -> Self {
        let scheduler = LrScheduler::from_config(config);
        info!("Scheduler: {}", scheduler.description());

        Self {
            model,
            optimizer,
            criterion: SaliencyLoss::new(config.criterion),
            scheduler,
            clipping: config.clipping,
            train_loader,
            val_loader,
            checkpoints: CheckpointStore::new(&config.model_path),
            show_progress: false,
            device,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// One optimization pass over the training loader
    pub fn train_pass(&mut self, epoch: usize) -> Result<PhaseSummary> {
        let mut loss_meter = AvgMeter::new();
        let mut mae_meter = AvgMeter::new();
        let lr = self.scheduler.current_lr();
        let num_batches = self.train_loader.num_batches();
        let bar = pass_bar(num_batches, "train", self.show_progress);

        for (batch_idx, items) in self.train_loader.iter(epoch).enumerate() {
            let items = items?;
            let n = items.len();
            let batch: TripletBatch<B> = TripletBatcher.batch(items, &self.device);

            let output = self.model.forward(batch.images);
            let loss = composite_loss(&self.criterion, &output, batch.masks.clone(), batch.edges);
            let mae = batch_mae(output.mask.detach(), batch.masks);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            let mae_value: f64 = mae.into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(SaliencyError::Training(format!(
                    "non-finite loss at epoch {} batch {}",
                    epoch,
                    batch_idx + 1
                )));
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            let (grads, grad_norm) = clip_grad_norm::<B, M>(&self.model, grads, self.clipping);
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            loss_meter.update(loss_value, n);
            mae_meter.update(mae_value, n);
            bar.inc(1);

            if (batch_idx + 1) % LOG_EVERY == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "  Batch {}/{}: loss = {:.4}, mae = {:.4}, grad norm = {:.3}",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    mae_value,
                    grad_norm
                );
            }
        }
        bar.finish_and_clear();

        info!("Train Loss:{:.3} | MAE:{:.3}", loss_meter.avg(), mae_meter.avg());
        Ok(PhaseSummary {
            loss: loss_meter.avg(),
            mae: mae_meter.avg(),
        })
    }

    /// Loss and MAE on the validation loader without gradients
    pub fn validation_pass(&self, epoch: usize) -> Result<PhaseSummary> {
        let model = self.model.valid();
        let mut loss_meter = AvgMeter::new();
        let mut mae_meter = AvgMeter::new();
        let bar = pass_bar(self.val_loader.num_batches(), "val", self.show_progress);

        for items in self.val_loader.iter(epoch) {
            let items = items?;
            let n = items.len();
            let batch: TripletBatch<B::InnerBackend> = TripletBatcher.batch(items, &self.device);

            let output = model.forward(batch.images);
            let loss = composite_loss(&self.criterion, &output, batch.masks.clone(), batch.edges);
            let mae = batch_mae(output.mask, batch.masks);

            loss_meter.update(loss.into_scalar().elem(), n);
            mae_meter.update(mae.into_scalar().elem(), n);
            bar.inc(1);
        }
        bar.finish_and_clear();

        info!("Valid Loss:{:.3} | MAE:{:.3}", loss_meter.avg(), mae_meter.avg());
        Ok(PhaseSummary {
            loss: loss_meter.avg(),
            mae: mae_meter.avg(),
        })
    }
}

impl<B, M, O> EpochDriver for Trainer<B, M, O>
where
    B: AutodiffBackend,
    M: SaliencyNetwork<B> + AutodiffModule<B>,
    <M as AutodiffModule<B>>::InnerModule: SaliencyNetwork<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    fn train_epoch(&mut self, epoch: usize) -> Result<PhaseSummary> {
        self.train_pass(epoch)
    }

    fn validate_epoch(&mut self, epoch: usize) -> Result<PhaseSummary> {
        self.validation_pass(epoch)
    }

    fn step_scheduler(&mut self, val_loss: f64) {
        let before = self.scheduler.current_lr();
        let after = self.scheduler.advance(val_loss);
        if after < before {
            info!("Learning rate reduced: {:.2e} -> {:.2e}", before, after);
        }
    }

    fn save_checkpoint(&mut self, artifact: CheckpointArtifact) -> Result<()> {
        self.checkpoints.save(&self.model, artifact).map(|_| ())
    }

    fn learning_rate(&self) -> f64 {
        self.scheduler.current_lr()
    }
}

/// Train and validation loaders over a fixed split
pub fn build_loaders(
    config: &RunConfig,
    splits: &DatasetSplits,
) -> Result<(SampleLoader<TripletSource>, SampleLoader<TripletSource>)> {
    let pipeline = AugmentationPipeline::new(config.augmentation_version()?, config.img_size);
    let augmentor = SynchronizedAugmentor::new(config.crop.clone());

    let train = SampleLoader::new(
        TripletSource::new(
            splits.train.clone(),
            TripletPhase::Train,
            augmentor.clone(),
            pipeline.clone(),
        ),
        LoaderConfig::train(config.batch_size, config.num_workers, splits.seed)
            .with_aug_seed(config.aug_seed),
    )?;
    let val = SampleLoader::new(
        TripletSource::new(splits.val.clone(), TripletPhase::Val, augmentor, pipeline),
        LoaderConfig::val(config.batch_size, config.num_workers, splits.seed)
            .with_aug_seed(config.aug_seed),
    )?;

    for (name, loader) in [("train", &train), ("val", &val)] {
        if loader.num_batches() == 0 {
            return Err(SaliencyError::Configuration(format!(
                "{} split has {} samples, fewer than batch_size {}",
                name,
                loader.num_samples(),
                config.batch_size
            )));
        }
    }

    Ok((train, val))
}

/// Full run on backend `B`: split, train, plot, report, benchmark
pub fn run_training_with<B: AutodiffBackend>(
    config: &RunConfig,
    device: B::Device,
    show_progress: bool,
) -> Result<TrainingReport> {
    config.validate()?;
    if config.multi_gpu {
        warn!("multi_gpu requested; training runs on a single device");
    }

    let model_dir = config.model_path.as_path();
    fs::create_dir_all(model_dir)?;
    config.save(&model_dir.join(CONFIG_FILE))?;

    let records = discover_triplets(config.train_root())?;
    let splitter = TripletSplitter::new(TripletSplitter::resolve_seed(config.seed), config.val_ratio)?;
    let splits = splitter.split(&records);
    info!("{}", splits);
    splits.save(model_dir.join(SPLITS_FILE))?;

    let (train_loader, val_loader) = build_loaders(config, &splits)?;

    let model = SaliencyNetConfig::new()
        .with_base_filters(config.base_filters)
        .init::<B>(&device);
    info!("Model parameters: {}", burn::module::Module::num_params(&model));

    let optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
        .init::<B, SaliencyNet<B>>();

    let mut trainer = Trainer::new(model, optimizer, config, train_loader, val_loader, device.clone())
        .with_progress(show_progress);
    let mut sink = JsonlScalarSink::create(model_dir.join(SCALARS_FILE))?;

    let outcome = Orchestrator::new(config.epochs, config.patience).run(&mut trainer, &mut sink)?;

    let plots = model_dir.join(PLOTS_DIR);
    save_training_curve(&outcome.train_losses(), &outcome.val_losses(), "Loss", &plots)?;
    save_training_curve(&outcome.train_maes(), &outcome.val_maes(), "MAE", &plots)?;

    let report_path = model_dir.join(REPORT_FILE);
    let has_best = outcome.has_best();
    let mut report = TrainingReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        backend: crate::backend::backend_name().to_string(),
        config: config.clone(),
        split_seed: splits.seed,
        train_samples: splits.train.len(),
        val_samples: splits.val.len(),
        outcome,
        benchmarks: Vec::new(),
    };
    report.save(&report_path)?;

    info!(phase = %RunPhase::FinalBenchmark, "Benchmarking best weights");
    if has_best {
        match benchmark_best::<B, _>(trainer.model().valid(), trainer.checkpoints(), config, device) {
            Ok(results) => {
                report.benchmarks = results;
                report.save(&report_path)?;
            }
            Err(e) => warn!("Benchmark failed: {}", e),
        }
    } else {
        warn!("No epoch improved on the initial loss; skipping benchmark");
    }
    info!(phase = %RunPhase::Done, "Report written to {:?}", report_path);

    Ok(report)
}

/// Reload `best_model` into `model` and score every benchmark dataset
fn benchmark_best<B, M>(
    model: M,
    store: &CheckpointStore,
    config: &RunConfig,
    device: B::Device,
) -> Result<Vec<BenchmarkResult>>
where
    B: AutodiffBackend,
    M: SaliencyNetwork<B::InnerBackend>,
{
    let model = store.load(model, BEST_MODEL, &device)?;

    let mut bench_config = config.clone();
    bench_config.save_map = None;
    bench_config.have_gt = true;

    let evaluator = Evaluator::<B::InnerBackend, M>::new(model, &bench_config, device)?;
    let results = evaluator.evaluate_all(&config.benchmark_datasets)?;
    if !results.is_empty() {
        info!("Benchmark results:\n{}", format_benchmark_table(&results));
    }
    Ok(results)
}

/// Check that a model directory holds a finished run
pub fn has_best_checkpoint(model_path: &Path) -> bool {
    CheckpointStore::new(model_path).exists(BEST_MODEL)
}
