//! Theraphosid CLI
//!
//! Entry point for training, fine-tuning, evaluating, and running inference
//! with the tarantula species classifier.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use theraphosid::backend::{backend_name, DefaultBackend, TrainingBackend};
use theraphosid::dataset::SpeciesDataset;
use theraphosid::inference::{ensure_checkpoint, Predictor};
use theraphosid::model::ArchVariant;
use theraphosid::training::{
    run_finetune, run_training, CheckpointMeta, FineTuneConfig, TrainingConfig,
};
use theraphosid::utils::logging::{init_logging, LogConfig};
use theraphosid::SCRATCH_IMAGE_SIZE;

/// Tarantula Species Classification
///
/// Training, evaluation, and inference for a ~100-class tarantula
/// (Theraphosidae) image classifier built on the Burn framework.
#[derive(Parser, Debug)]
#[command(name = "theraphosid")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "Tarantula species classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a classifier from a dataset with train/ and val/ splits
    Train {
        /// Dataset root containing train/ and val/ directories
        #[arg(short, long, default_value = "data/tarantulas")]
        data_dir: String,

        /// Architecture: "scratch" or "transfer"
        #[arg(short, long, default_value = "scratch")]
        arch: String,

        /// Maximum number of training epochs
        #[arg(short, long, default_value = "100")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Initial learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// Epochs without improvement before stopping
        #[arg(long, default_value = "20")]
        early_stop_patience: usize,

        /// Stale epochs before the learning rate is halved
        #[arg(long, default_value = "5")]
        plateau_patience: usize,

        /// Output directory for checkpoints
        #[arg(short, long, default_value = "output/models")]
        output_dir: String,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Disable training-time augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Pretrained backbone weights (.mpk) for the transfer architecture
        #[arg(long)]
        pretrained: Option<PathBuf>,
    },

    /// Fine-tune a transfer checkpoint with a partially frozen backbone
    Finetune {
        /// Dataset root containing train/ and val/ directories
        #[arg(short, long, default_value = "data/tarantulas")]
        data_dir: String,

        /// Checkpoint stem to resume from (without .mpk/.json)
        #[arg(short, long)]
        checkpoint: String,

        /// Backbone stages 0..N stay frozen
        #[arg(short, long, default_value = "3")]
        unfreeze_from: usize,

        /// Maximum number of fine-tuning epochs
        #[arg(short, long, default_value = "50")]
        epochs: usize,

        /// Learning rate for fine-tuning
        #[arg(short, long, default_value = "0.00001")]
        learning_rate: f64,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Evaluate a checkpoint on a held-out test directory
    Evaluate {
        /// Checkpoint stem to evaluate
        #[arg(short, long)]
        checkpoint: String,

        /// Test directory with one subdirectory per species
        #[arg(short, long, default_value = "data/tarantulas/test")]
        test_dir: String,

        /// Where the CSV reports are written
        #[arg(short, long, default_value = "output/eval")]
        output_dir: String,

        /// Batch size
        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },

    /// Predict the species on a single image
    Predict {
        /// Checkpoint stem to load
        #[arg(short, long)]
        checkpoint: String,

        /// Path to the input image
        #[arg(short, long)]
        input: String,

        /// Fetch the checkpoint weights from this URL if absent
        #[arg(long)]
        model_url: Option<String>,
    },

    /// Print dataset statistics
    Stats {
        /// Directory with one subdirectory per species
        #[arg(short, long, default_value = "data/tarantulas/train")]
        data_dir: String,
    },
}

fn banner() {
    println!();
    println!(
        "{}",
        "  Theraphosid: Tarantula Species Classification"
            .cyan()
            .bold()
    );
    println!("  Backend: {}", backend_name());
    println!();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    // A second init (e.g. in tests) is harmless
    let _ = init_logging(&log_config);

    banner();

    match cli.command {
        Commands::Train {
            data_dir,
            arch,
            epochs,
            batch_size,
            learning_rate,
            early_stop_patience,
            plateau_patience,
            output_dir,
            seed,
            no_augmentation,
            pretrained,
        } => {
            let variant: ArchVariant = arch.parse()?;
            let mut config = TrainingConfig {
                epochs,
                batch_size,
                learning_rate,
                early_stop_patience,
                plateau_patience,
                seed,
                ..TrainingConfig::default()
            };
            if no_augmentation {
                config.augmentation = theraphosid::dataset::AugmentationConfig::none();
            }

            run_training::<TrainingBackend>(
                &data_dir,
                variant,
                config,
                &output_dir,
                pretrained.as_deref(),
            )?;
        }

        Commands::Finetune {
            data_dir,
            checkpoint,
            unfreeze_from,
            epochs,
            learning_rate,
            seed,
        } => {
            let mut config = FineTuneConfig {
                unfreeze_from,
                ..FineTuneConfig::default()
            };
            config.training.epochs = epochs;
            config.training.learning_rate = learning_rate;
            config.training.seed = seed;

            run_finetune::<TrainingBackend>(&data_dir, Path::new(&checkpoint), config)?;
        }

        Commands::Evaluate {
            checkpoint,
            test_dir,
            output_dir,
            batch_size,
        } => {
            theraphosid::eval::run_evaluation::<DefaultBackend>(
                Path::new(&checkpoint),
                &test_dir,
                &output_dir,
                batch_size,
            )?;
        }

        Commands::Predict {
            checkpoint,
            input,
            model_url,
        } => {
            let stem = PathBuf::from(&checkpoint);
            if let Some(url) = model_url {
                ensure_checkpoint(&url, &CheckpointMeta::weights_path(&stem))?;
            }

            let device = theraphosid::backend::default_device();
            let predictor = Predictor::<DefaultBackend>::load(&stem, device)?;
            let result = predictor.predict_file(Path::new(&input))?;
            println!("{}", result.display());
        }

        Commands::Stats { data_dir } => {
            let dataset = SpeciesDataset::from_dir(&data_dir, SCRATCH_IMAGE_SIZE)?;
            dataset.stats().print();
        }
    }

    Ok(())
}
