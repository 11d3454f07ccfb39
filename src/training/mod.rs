//! Training drivers
//!
//! The supervised driver trains either architecture from a dataset root
//! laid out as `<root>/train/<species>/*.jpg` and `<root>/val/<species>/*.jpg`.
//! Fine-tuning resumes from a transfer checkpoint with a frozen backbone
//! prefix and writes to a separate `_finetuned` stem.

pub mod checkpoint;
pub mod finetune;
pub mod trainer;

pub use checkpoint::CheckpointMeta;
pub use finetune::{run_finetune, FineTuneConfig};
pub use trainer::{MonitorSignal, Trainer, TrainingState};

use std::path::{Path, PathBuf};

use burn::{
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::dataset::{
    AugmentationConfig, Augmenter, SpeciesBatcher, SpeciesDataset,
};
use crate::model::{
    ArchVariant, BackboneClassifier, Classifier, ModelConfig, TarantulaClassifier,
};
use crate::utils::error::{Error, Result};

/// Supervised training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Maximum number of epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Epochs without improvement before stopping
    pub early_stop_patience: usize,
    /// Stale epochs before the learning rate is reduced
    pub plateau_patience: usize,
    /// Multiplier applied to the learning rate on plateau
    pub lr_factor: f64,
    /// Lower bound for the scheduled learning rate
    pub min_lr: f64,
    /// Seed for shuffling and augmentation
    pub seed: u64,
    /// Augmentation applied to training samples
    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            early_stop_patience: 20,
            plateau_patience: 5,
            lr_factor: 0.5,
            min_lr: 1e-6,
            seed: 42,
            augmentation: AugmentationConfig::default(),
        }
    }
}

/// Load train/val datasets and check they agree on the label space.
fn load_splits(
    data_dir: &Path,
    image_size: usize,
) -> Result<(SpeciesDataset, SpeciesDataset)> {
    let train = SpeciesDataset::from_dir(data_dir.join("train"), image_size)?;
    let val = SpeciesDataset::from_dir(data_dir.join("val"), image_size)?;

    if train.catalog().names() != val.catalog().names() {
        return Err(Error::Dataset(format!(
            "train and val label spaces differ: {} vs {} classes",
            train.catalog().len(),
            val.catalog().len()
        )));
    }

    Ok((train, val))
}

/// Run supervised training with the given configuration
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g. `Autodiff<NdArray>`)
pub fn run_training<B>(
    data_dir: &str,
    variant: ArchVariant,
    config: TrainingConfig,
    output_dir: &str,
    pretrained_backbone: Option<&Path>,
) -> Result<()>
where
    B: AutodiffBackend,
{
    if pretrained_backbone.is_some() && variant != ArchVariant::Transfer {
        return Err(Error::Config(
            "pretrained backbone weights only apply to the transfer architecture".to_string(),
        ));
    }

    println!("{}", "Initializing Training...".green().bold());

    let device = B::Device::default();
    println!("  Device: {:?}", device);
    println!("  Architecture: {}", variant);

    std::fs::create_dir_all(output_dir)?;

    let image_size = variant.input_size();
    let normalization = variant.normalization();

    println!("{}", "Loading Dataset...".cyan());
    let (train_dataset, val_dataset) = load_splits(Path::new(data_dir), image_size)?;
    train_dataset.stats().print();

    let catalog = train_dataset.catalog().clone();
    let num_classes = catalog.len();

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Training samples:   {}", train_dataset.len());
    println!("  Validation samples: {}", val_dataset.len());
    println!("  Classes:            {}", num_classes);
    println!("  Image size:         {0}x{0}", image_size);
    println!("  Epochs:             {}", config.epochs);
    println!("  Batch size:         {}", config.batch_size);
    println!("  Learning rate:      {}", config.learning_rate);
    println!();

    let model_config = ModelConfig::for_variant(variant, num_classes);
    model_config.validate()?;

    let batcher = SpeciesBatcher::new(image_size, normalization);
    let meta = CheckpointMeta::new(variant, image_size, normalization, catalog);
    let stem = PathBuf::from(output_dir).join(format!("tarantula_{}", variant));

    println!("{}", "Starting Training...".green().bold());
    println!();

    let device_clone = device.clone();
    let best_val_loss = match variant {
        ArchVariant::Scratch => {
            let model = TarantulaClassifier::<B>::new(&model_config, &device);
            fit_classifier::<B, _>(
                model,
                config,
                meta,
                stem.clone(),
                device_clone,
                &train_dataset,
                &val_dataset,
                &batcher,
            )?
        }
        ArchVariant::Transfer => {
            let mut model = BackboneClassifier::<B>::new(&model_config, &device);
            if let Some(path) = pretrained_backbone {
                // Pretrained features stay frozen for the initial run; a
                // later fine-tuning pass unfreezes a suffix of stages.
                model = model
                    .load_backbone_weights(path, &device)?
                    .freeze_prefix(model_config.backbone_filters.len());
            }
            fit_classifier::<B, _>(
                model,
                config,
                meta,
                stem.clone(),
                device_clone,
                &train_dataset,
                &val_dataset,
                &batcher,
            )?
        }
    };

    println!("{}", "Training Complete!".green().bold());
    println!("  Best validation loss: {:.4}", best_val_loss);
    println!("  Checkpoint: {:?}", stem);

    Ok(())
}

/// Fit one classifier and return the best validation loss.
#[allow(clippy::too_many_arguments)]
fn fit_classifier<B, M>(
    model: M,
    config: TrainingConfig,
    meta: CheckpointMeta,
    stem: PathBuf,
    device: B::Device,
    train_dataset: &SpeciesDataset,
    val_dataset: &SpeciesDataset,
    batcher: &SpeciesBatcher,
) -> Result<f64>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B>,
    M::InnerModule: Classifier<B::InnerBackend>,
{
    let augmenter = Augmenter::new(config.augmentation.clone());
    let mut trainer = Trainer::new(model, config, meta, stem, device);
    trainer.fit(train_dataset, val_dataset, batcher, &augmenter)?;
    Ok(trainer.state.best_val_loss)
}
