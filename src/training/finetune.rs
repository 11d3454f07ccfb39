//! Fine-tuning driver
//!
//! Resumes a transfer-learning checkpoint, freezes a configurable prefix of
//! backbone stages, and continues training at a much lower learning rate.
//! Results are written to a separate `<stem>_finetuned` checkpoint so the
//! original weights survive a bad run.

use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::AutodiffBackend};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::checkpoint::CheckpointMeta;
use super::{Trainer, TrainingConfig};
use crate::dataset::{Augmenter, SpeciesBatcher, SpeciesDataset};
use crate::model::{ArchVariant, BackboneClassifier, ModelConfig};
use crate::utils::error::{Error, Result};

/// Fine-tuning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTuneConfig {
    /// Training loop settings; the learning rate defaults far below the
    /// supervised one to avoid destroying pretrained features.
    pub training: TrainingConfig,
    /// Backbone stages `0..unfreeze_from` stay frozen; later stages and the
    /// head are trained.
    pub unfreeze_from: usize,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        Self {
            training: TrainingConfig {
                epochs: 50,
                learning_rate: 1e-5,
                ..TrainingConfig::default()
            },
            unfreeze_from: 3,
        }
    }
}

/// Checkpoint stem for the fine-tuned weights
pub fn finetuned_stem(stem: &Path) -> PathBuf {
    let mut path = stem.as_os_str().to_owned();
    path.push("_finetuned");
    PathBuf::from(path)
}

/// Fine-tune a transfer-learning checkpoint
///
/// # Arguments
/// * `data_dir` - Dataset root with `train/` and `val/` subdirectories
/// * `checkpoint_stem` - Stem of the checkpoint to resume from
pub fn run_finetune<B>(
    data_dir: &str,
    checkpoint_stem: &Path,
    config: FineTuneConfig,
) -> Result<()>
where
    B: AutodiffBackend,
{
    println!("{}", "Initializing Fine-Tuning...".green().bold());

    let device = B::Device::default();
    println!("  Device: {:?}", device);

    let meta = CheckpointMeta::load(checkpoint_stem)?;
    if meta.variant != ArchVariant::Transfer {
        return Err(Error::Config(format!(
            "fine-tuning requires a transfer checkpoint, found '{}'",
            meta.variant
        )));
    }

    println!("{}", "Loading Dataset...".cyan());
    let (train_dataset, val_dataset) =
        super::load_splits(Path::new(data_dir), meta.input_size)?;

    if train_dataset.catalog().names() != meta.catalog.names() {
        return Err(Error::Integrity(format!(
            "dataset label space ({} classes) does not match checkpoint catalog ({} classes)",
            train_dataset.catalog().len(),
            meta.catalog.len()
        )));
    }

    let model_config = ModelConfig::for_variant(ArchVariant::Transfer, meta.num_classes);
    model_config.validate()?;

    info!("Resuming from checkpoint {:?}", checkpoint_stem);
    let recorder = CompactRecorder::new();
    let model = BackboneClassifier::<B>::new(&model_config, &device)
        .load_file(checkpoint_stem, &recorder, &device)
        .map_err(|e| Error::Model(format!("failed to load checkpoint: {:?}", e)))?
        .freeze_prefix(config.unfreeze_from);

    let stem = finetuned_stem(checkpoint_stem);

    println!();
    println!("{}", "Fine-Tuning Configuration:".cyan().bold());
    println!("  Training samples:   {}", train_dataset.len());
    println!("  Validation samples: {}", val_dataset.len());
    println!("  Frozen stages:      0..{}", config.unfreeze_from);
    println!("  Learning rate:      {}", config.training.learning_rate);
    println!("  Checkpoint:         {:?}", stem);
    println!();

    let batcher = SpeciesBatcher::new(meta.input_size, meta.normalization);
    let augmenter = Augmenter::new(config.training.augmentation.clone());

    // Fresh metadata prototype: val_loss/epoch restart for the new run
    let proto = CheckpointMeta::new(
        meta.variant,
        meta.input_size,
        meta.normalization,
        meta.catalog,
    );

    println!("{}", "Starting Fine-Tuning...".green().bold());
    println!();

    let mut trainer = Trainer::new(model, config.training, proto, stem.clone(), device);
    trainer.fit(&train_dataset, &val_dataset, &batcher, &augmenter)?;

    println!("{}", "Fine-Tuning Complete!".green().bold());
    println!("  Best validation loss: {:.4}", trainer.state.best_val_loss);
    println!("  Checkpoint: {:?}", stem);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finetuned_stem() {
        let stem = Path::new("output/models/tarantula_transfer");
        assert_eq!(
            finetuned_stem(stem),
            PathBuf::from("output/models/tarantula_transfer_finetuned")
        );
    }

    #[test]
    fn test_default_learning_rate_is_reduced() {
        let config = FineTuneConfig::default();
        assert!(config.training.learning_rate < TrainingConfig::default().learning_rate);
    }
}
