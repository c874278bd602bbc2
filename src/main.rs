//! Salient Trainer CLI
//!
//! Entry point for training saliency networks, benchmarking saved weights
//! and inspecting dataset folders.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use salient_trainer::backend::{backend_name, default_device, EvalBackend};
use salient_trainer::dataset::loader::{discover_triplets, DatasetStats};
use salient_trainer::dataset::split::TripletSplitter;
use salient_trainer::inference::{format_benchmark_table, Evaluator};
use salient_trainer::model::config::{CriterionKind, RunConfig, SchedulerKind};
use salient_trainer::model::{SaliencyNet, SaliencyNetConfig};
use salient_trainer::training::{run_training, StopReason};
use salient_trainer::utils::format_duration;
use salient_trainer::utils::logging::{init_logging, LogConfig};

/// Salient object detection training and benchmarking with Burn
#[derive(Parser, Debug)]
#[command(name = "salient_trainer")]
#[command(version)]
#[command(about = "Train and benchmark salient object detection networks", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train on `<data_path>/<dataset>/Train`, then benchmark the best weights
    Train(RunArgs),

    /// Evaluate saved weights on one or more test sets
    Test {
        #[command(flatten)]
        run: RunArgs,

        /// Test sets to evaluate (defaults to --dataset)
        #[arg(long, value_delimiter = ',')]
        datasets: Vec<String>,

        /// Test images have no masks; only write maps
        #[arg(long, default_value = "false")]
        no_gt: bool,
    },

    /// Show sample counts, the split and benchmark availability
    Stats {
        /// Root folder holding the datasets
        #[arg(short, long, default_value = "data")]
        data_path: PathBuf,

        /// Training dataset
        #[arg(long, default_value = "DUTS")]
        dataset: String,

        /// Validation fraction used for the split preview
        #[arg(long, default_value = "0.2")]
        val_ratio: f64,

        /// Split seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

/// Run settings; every flag overrides the value from `--config`
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// JSON configuration file to start from
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_path: Option<PathBuf>,

    #[arg(long)]
    dataset: Option<String>,

    /// Checkpoint directory
    #[arg(long)]
    model_path: Option<PathBuf>,

    #[arg(long)]
    img_size: Option<usize>,

    /// Augmentation version (1 or 2)
    #[arg(long)]
    aug_ver: Option<u8>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    num_workers: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    patience: Option<usize>,

    /// Gradient norm clipping threshold
    #[arg(long)]
    clipping: Option<f64>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    weight_decay: Option<f64>,

    #[arg(long)]
    lr_factor: Option<f64>,

    /// Reduce, Step or Cosine
    #[arg(long)]
    scheduler: Option<String>,

    /// bce, iou or API (both)
    #[arg(long)]
    criterion: Option<String>,

    /// Split seed
    #[arg(long)]
    seed: Option<u64>,

    /// Per-sample augmentation seed
    #[arg(long)]
    aug_seed: Option<u64>,

    #[arg(long, default_value = "false")]
    multi_gpu: bool,

    /// Write prediction maps under this folder
    #[arg(long)]
    save_map: Option<PathBuf>,

    /// Image the maps are composited over
    #[arg(long)]
    background: Option<PathBuf>,

    /// Checkpoint to evaluate
    #[arg(long)]
    model_name: Option<String>,

    #[arg(long)]
    base_filters: Option<usize>,
}

impl RunArgs {
    /// Load `--config` (or defaults) and apply flag overrides
    fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => RunConfig::default(),
        };

        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(value) = &self.$field {
                    config.$field = value.clone();
                })*
            };
        }
        apply!(
            data_path, dataset, model_path, img_size, aug_ver, batch_size, num_workers, epochs,
            patience, clipping, learning_rate, weight_decay, lr_factor, model_name, base_filters
        );

        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(seed) = self.aug_seed {
            config.aug_seed = Some(seed);
        }
        if let Some(dir) = &self.save_map {
            config.save_map = Some(dir.clone());
        }
        if let Some(bg) = &self.background {
            config.background = Some(bg.clone());
        }
        if let Some(s) = &self.scheduler {
            config.scheduler = SchedulerKind::parse(s)?;
        }
        if let Some(c) = &self.criterion {
            config.criterion = CriterionKind::parse(c)?;
        }
        config.multi_gpu |= self.multi_gpu;

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => cmd_train(&args)?,
        Commands::Test { run, datasets, no_gt } => cmd_test(&run, datasets, no_gt)?,
        Commands::Stats {
            data_path,
            dataset,
            val_ratio,
            seed,
        } => cmd_stats(&data_path, &dataset, val_ratio, seed)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        format!(
            "\n  Salient Trainer v{}  |  salient object detection with Burn  |  {}\n",
            salient_trainer::VERSION,
            backend_name()
        )
        .green()
        .bold()
    );
}

fn cmd_train(args: &RunArgs) -> Result<()> {
    let config = args.resolve()?;
    if config.multi_gpu {
        warn!("Multi-GPU training is not supported; using one device");
    }

    println!("{}", "Training configuration".cyan().bold());
    println!("  Data:        {:?} / {}", config.data_path, config.dataset);
    println!("  Checkpoints: {:?}", config.model_path);
    println!(
        "  Epochs: {}  Batch: {}  Image: {}  Aug: v{}",
        config.epochs, config.batch_size, config.img_size, config.aug_ver
    );
    println!(
        "  LR: {:.2e}  Scheduler: {:?}  Criterion: {:?}  Patience: {}",
        config.learning_rate, config.scheduler, config.criterion, config.patience
    );
    println!();

    let report = run_training(&config, true).context("Training failed")?;
    let outcome = &report.outcome;

    let stop = match outcome.stop_reason {
        StopReason::EarlyStopped => "early stopped".yellow(),
        StopReason::EpochLimitReached => "epoch limit reached".green(),
    };
    println!();
    println!("{} ({})", "Training complete".green().bold(), stop);
    println!(
        "  Best Val Epoch: {} | Val Loss: {:.3} | Val MAE: {:.3} | time: {}",
        outcome.best_epoch,
        outcome.best_loss,
        outcome.best_mae,
        format_duration(outcome.elapsed_secs)
    );

    if report.benchmarks.is_empty() {
        println!("{}", "No benchmark datasets found".yellow());
    } else {
        println!();
        println!("{}", "Benchmark".cyan().bold());
        print!("{}", format_benchmark_table(&report.benchmarks));
    }

    Ok(())
}

fn cmd_test(args: &RunArgs, datasets: Vec<String>, no_gt: bool) -> Result<()> {
    let mut config = args.resolve()?;
    if no_gt {
        config.have_gt = false;
    }
    let datasets = if datasets.is_empty() {
        vec![config.dataset.clone()]
    } else {
        datasets
    };

    let device = default_device();
    let model: SaliencyNet<EvalBackend> = SaliencyNetConfig::new()
        .with_base_filters(config.base_filters)
        .init(&device);

    let evaluator = Evaluator::<EvalBackend, _>::from_checkpoint(model, &config, device)
        .context("Failed to restore checkpoint")?
        .with_progress(true);
    if let Some(dir) = evaluator.output_dir() {
        info!("Writing prediction maps to {:?}", dir);
    }

    let mut results = Vec::with_capacity(datasets.len());
    for dataset in &datasets {
        let result = evaluator
            .evaluate_dataset(dataset)
            .with_context(|| format!("Evaluation of {} failed", dataset))?;
        println!("{}", result.summary());
        results.push(result);
    }

    if config.have_gt {
        println!();
        print!("{}", format_benchmark_table(&results));
    }
    Ok(())
}

fn cmd_stats(data_path: &Path, dataset: &str, val_ratio: f64, seed: u64) -> Result<()> {
    println!("{}", "Dataset statistics".cyan().bold());
    println!("{}", DatasetStats::collect(data_path, dataset));

    match discover_triplets(data_path.join(dataset).join("Train")) {
        Ok(records) => {
            let splits = TripletSplitter::new(seed, val_ratio)?.split(&records);
            println!("{}", splits);
        }
        Err(e) => println!("  {} {}", "No training triplets:".yellow(), e),
    }

    println!();
    println!("{}", "Benchmark datasets".cyan().bold());
    for name in salient_trainer::BENCHMARK_DATASETS {
        let stats = DatasetStats::collect(data_path, name);
        let line = stats.to_string();
        if stats.test_images.is_some() {
            println!("{}", line);
        } else {
            println!("{}", line.dimmed());
        }
    }

    Ok(())
}
