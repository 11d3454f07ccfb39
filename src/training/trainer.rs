//! Training loop for tarantula classifiers
//!
//! A custom epoch loop on top of Burn's autodiff:
//! - Forward/backward passes with cross-entropy loss
//! - Adam optimizer with reduce-on-plateau learning rate scheduling
//! - Checkpoint-on-best keyed to validation loss
//! - Early stopping with best-weights restore
//!
//! A non-finite loss anywhere aborts the run before a checkpoint can be
//! written, so a saved model is never poisoned by a diverged update.

use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use super::checkpoint::CheckpointMeta;
use super::TrainingConfig;
use crate::dataset::{Augmenter, EpochPlan, SpeciesBatcher, SpeciesDataset, SpeciesItem};
use crate::model::Classifier;
use crate::utils::error::{Error, Result};

/// Outcome of one validation observation
#[derive(Debug, Clone, Copy)]
pub struct MonitorSignal {
    /// Validation loss improved on the best seen so far
    pub improved: bool,
    /// The plateau scheduler reduced the learning rate this epoch
    pub lr_reduced: bool,
    /// Early stopping patience is exhausted
    pub stop: bool,
}

/// Training state for checkpointing and monitoring
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Best validation loss seen so far
    pub best_val_loss: f64,
    /// Epoch (1-indexed) the best checkpoint was written at
    pub best_epoch: usize,
    /// Epochs since the last improvement (early stopping counter)
    pub epochs_without_improvement: usize,
    /// Epochs since the last improvement or LR reduction (plateau counter)
    pub plateau_counter: usize,
    /// Current learning rate
    pub current_lr: f64,
    /// Training loss history (per epoch)
    pub train_losses: Vec<f64>,
    /// Validation loss history (per epoch)
    pub val_losses: Vec<f64>,
}

impl TrainingState {
    /// Create a new training state with initial learning rate
    pub fn new(initial_lr: f64) -> Self {
        Self {
            epoch: 0,
            best_val_loss: f64::INFINITY,
            best_epoch: 0,
            epochs_without_improvement: 0,
            plateau_counter: 0,
            current_lr: initial_lr,
            train_losses: Vec::new(),
            val_losses: Vec::new(),
        }
    }

    /// Feed one epoch's validation loss through the monitors.
    ///
    /// The plateau counter resets both on improvement and after a reduction,
    /// so the scheduler waits a full patience window at the new rate. The
    /// early stopping counter resets only on improvement.
    pub fn observe(&mut self, val_loss: f64, config: &TrainingConfig) -> MonitorSignal {
        self.val_losses.push(val_loss);

        let improved = val_loss < self.best_val_loss;
        if improved {
            self.best_val_loss = val_loss;
            self.best_epoch = self.epoch + 1;
            self.epochs_without_improvement = 0;
            self.plateau_counter = 0;
        } else {
            self.epochs_without_improvement += 1;
            self.plateau_counter += 1;
        }

        let mut lr_reduced = false;
        if self.plateau_counter >= config.plateau_patience && self.current_lr > config.min_lr {
            let new_lr = (self.current_lr * config.lr_factor).max(config.min_lr);
            debug!(
                "Plateau: learning rate {:.2e} -> {:.2e}",
                self.current_lr, new_lr
            );
            self.current_lr = new_lr;
            self.plateau_counter = 0;
            lr_reduced = true;
        }

        let stop = self.epochs_without_improvement >= config.early_stop_patience;

        MonitorSignal {
            improved,
            lr_reduced,
            stop,
        }
    }
}

/// Trainer for any classifier architecture
pub struct Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B>,
    M::InnerModule: Classifier<B::InnerBackend>,
{
    /// Model being trained
    pub model: M,
    /// Adam optimizer
    optimizer: OptimizerAdaptor<Adam, M, B>,
    /// Training configuration
    pub config: TrainingConfig,
    /// Current training state
    pub state: TrainingState,
    /// Metadata prototype written next to every checkpoint
    meta: CheckpointMeta,
    /// Checkpoint stem; weights land at `<stem>.mpk`, metadata at `<stem>.json`
    checkpoint_stem: PathBuf,
    /// Device to train on
    device: B::Device,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Classifier<B>,
    M::InnerModule: Classifier<B::InnerBackend>,
{
    /// Create a new trainer with the given model and configuration
    pub fn new(
        model: M,
        config: TrainingConfig,
        meta: CheckpointMeta,
        checkpoint_stem: PathBuf,
        device: B::Device,
    ) -> Self {
        let optimizer = AdamConfig::new().init();
        let state = TrainingState::new(config.learning_rate);

        Self {
            model,
            optimizer,
            config,
            state,
            meta,
            checkpoint_stem,
            device,
        }
    }

    /// Train for one epoch over a shuffled pass of the dataset.
    ///
    /// Returns (average_loss, accuracy).
    pub fn train_epoch(
        &mut self,
        dataset: &SpeciesDataset,
        batcher: &SpeciesBatcher,
        augmenter: &Augmenter,
        rng: &mut ChaCha8Rng,
    ) -> Result<(f64, f64)> {
        let plan = EpochPlan::shuffled(dataset.len(), self.config.batch_size, rng);
        let num_batches = plan.num_batches();

        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut total = 0usize;

        for (batch_idx, batch_indices) in plan.batches().enumerate() {
            let mut items: Vec<SpeciesItem> = Vec::with_capacity(batch_indices.len());
            for &idx in batch_indices {
                if let Some(item) = dataset.item_augmented(idx, augmenter, rng) {
                    items.push(item);
                }
            }
            if items.is_empty() {
                continue;
            }

            let batch = batcher.batch(items, &self.device);

            // Forward pass
            let output = self.model.forward(batch.images.clone());
            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(Error::Training(format!(
                    "non-finite training loss at epoch {}, batch {}/{}",
                    self.state.epoch + 1,
                    batch_idx + 1,
                    num_batches
                )));
            }
            total_loss += loss_value;

            // Batch accuracy
            let predictions = output.argmax(1).squeeze::<1>(1);
            let batch_correct: i64 = predictions
                .equal(batch.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            total += batch.targets.dims()[0];

            // Backward pass and parameter update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.state.current_lr, self.model.clone(), grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx == num_batches - 1 {
                debug!(
                    "  Batch {}/{}: loss = {:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    100.0 * correct as f64 / total.max(1) as f64
                );
            }
        }

        let avg_loss = total_loss / num_batches.max(1) as f64;
        let accuracy = correct as f64 / total.max(1) as f64;
        self.state.train_losses.push(avg_loss);

        Ok((avg_loss, accuracy))
    }

    /// Evaluate on a dataset in deterministic order, without augmentation.
    ///
    /// Uses the inner (non-autodiff) model. Returns (average_loss, accuracy).
    pub fn validate(
        &self,
        dataset: &SpeciesDataset,
        batcher: &SpeciesBatcher,
    ) -> Result<(f64, f64)> {
        let inner_model = self.model.valid();
        // AutodiffBackend pins InnerBackend::Device to B::Device, so
        // validation runs on the same device training does.
        let inner_device: <B::InnerBackend as Backend>::Device = self.device.clone();

        let plan = EpochPlan::ordered(dataset.len(), self.config.batch_size);
        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut total = 0usize;

        for batch_indices in plan.batches() {
            let items: Vec<SpeciesItem> = batch_indices
                .iter()
                .filter_map(|&idx| dataset.get(idx))
                .collect();
            if items.is_empty() {
                continue;
            }

            let batch = batcher.batch(items, &inner_device);
            let output = inner_model.forward(batch.images);

            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());
            let loss_value: f64 = loss.into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(Error::Training(format!(
                    "non-finite validation loss at epoch {}",
                    self.state.epoch + 1
                )));
            }
            total_loss += loss_value;

            let predictions: Tensor<B::InnerBackend, 1, Int> =
                output.argmax(1).squeeze::<1>(1);
            let batch_correct: i64 = predictions
                .equal(batch.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            total += batch.targets.dims()[0];
        }

        let avg_loss = total_loss / plan.num_batches().max(1) as f64;
        let accuracy = correct as f64 / total.max(1) as f64;

        Ok((avg_loss, accuracy))
    }

    /// Run validation monitors for the epoch; checkpoints on improvement.
    pub fn observe_validation(&mut self, val_loss: f64) -> Result<MonitorSignal> {
        let config = self.config.clone();
        let signal = self.state.observe(val_loss, &config);

        if signal.improved {
            self.save_checkpoint(val_loss)?;
        }
        if signal.lr_reduced {
            info!(
                "Reduced learning rate to {:.2e} after plateau",
                self.state.current_lr
            );
        }
        if signal.stop {
            warn!(
                "Early stopping: no improvement for {} epochs (best val loss {:.4} at epoch {})",
                self.config.early_stop_patience, self.state.best_val_loss, self.state.best_epoch
            );
        }

        Ok(signal)
    }

    /// Save model weights and metadata at the checkpoint stem.
    fn save_checkpoint(&self, val_loss: f64) -> Result<()> {
        if let Some(parent) = self.checkpoint_stem.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let recorder = CompactRecorder::new();
        self.model
            .clone()
            .save_file(&self.checkpoint_stem, &recorder)
            .map_err(|e| Error::Training(format!("failed to save checkpoint: {:?}", e)))?;

        self.meta
            .save(&self.checkpoint_stem, val_loss, self.state.epoch + 1)?;

        info!(
            "Checkpoint saved to {:?} (epoch {}, val loss {:.4})",
            self.checkpoint_stem,
            self.state.epoch + 1,
            val_loss
        );
        Ok(())
    }

    /// Load the best checkpoint back into the live model.
    pub fn restore_best(&mut self) -> Result<()> {
        let weights = CheckpointMeta::weights_path(&self.checkpoint_stem);
        if !weights.exists() {
            return Err(Error::PathNotFound(weights));
        }

        let recorder = CompactRecorder::new();
        self.model = self
            .model
            .clone()
            .load_file(&self.checkpoint_stem, &recorder, &self.device)
            .map_err(|e| Error::Training(format!("failed to restore checkpoint: {:?}", e)))?;

        info!(
            "Restored best weights from epoch {} (val loss {:.4})",
            self.state.best_epoch, self.state.best_val_loss
        );
        Ok(())
    }

    /// Full training run: epochs of train + validate with monitoring,
    /// finishing on the best saved weights.
    pub fn fit(
        &mut self,
        train_dataset: &SpeciesDataset,
        val_dataset: &SpeciesDataset,
        batcher: &SpeciesBatcher,
        augmenter: &Augmenter,
    ) -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        for epoch in 0..self.config.epochs {
            self.state.epoch = epoch;
            println!(
                "{}",
                format!("Epoch {}/{}", epoch + 1, self.config.epochs)
                    .yellow()
                    .bold()
            );

            let (train_loss, train_acc) =
                self.train_epoch(train_dataset, batcher, augmenter, &mut rng)?;
            let (val_loss, val_acc) = self.validate(val_dataset, batcher)?;
            let signal = self.observe_validation(val_loss)?;

            println!(
                "  {} Loss: {:.4} | Train Acc: {:.2}% | Val Loss: {:.4} | Val Acc: {:.2}% | LR: {:.2e}{}",
                "→".cyan(),
                train_loss,
                train_acc * 100.0,
                val_loss,
                val_acc * 100.0,
                self.state.current_lr,
                if signal.improved {
                    " (best)".green().to_string()
                } else {
                    String::new()
                }
            );
            println!();

            if signal.stop {
                break;
            }
        }

        self.restore_best()
    }

    /// Get reference to the model
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Get the device
    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::TrainingConfig;

    fn config() -> TrainingConfig {
        TrainingConfig {
            early_stop_patience: 3,
            plateau_patience: 2,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_best_loss_only_improves() {
        let config = config();
        let mut state = TrainingState::new(config.learning_rate);

        for (epoch, &loss) in [1.0, 0.8, 0.9, 0.7].iter().enumerate() {
            state.epoch = epoch;
            state.observe(loss, &config);
        }

        assert!((state.best_val_loss - 0.7).abs() < 1e-9);
        assert_eq!(state.best_epoch, 4);
    }

    #[test]
    fn test_checkpoint_sequence_is_monotonic() {
        let config = config();
        let mut state = TrainingState::new(config.learning_rate);

        let mut checkpointed = Vec::new();
        for (epoch, &loss) in [2.0, 1.5, 1.7, 1.4, 1.4, 1.1].iter().enumerate() {
            state.epoch = epoch;
            if state.observe(loss, &config).improved {
                checkpointed.push(loss);
            }
        }

        assert_eq!(checkpointed, vec![2.0, 1.5, 1.4, 1.1]);
        for pair in checkpointed.windows(2) {
            assert!(pair[1] < pair[0]);
        }
    }

    #[test]
    fn test_plateau_halves_lr_with_floor() {
        let mut config = config();
        config.learning_rate = 4e-6;
        config.min_lr = 1e-6;
        let mut state = TrainingState::new(config.learning_rate);

        state.observe(1.0, &config);

        // Two stale epochs trigger the first reduction: 4e-6 -> 2e-6
        state.observe(1.5, &config);
        let signal = state.observe(1.5, &config);
        assert!(signal.lr_reduced);
        assert!((state.current_lr - 2e-6).abs() < 1e-12);

        // Counter was reset; the next reduction needs two more stale epochs
        let signal = state.observe(1.5, &config);
        assert!(!signal.lr_reduced);
        state.observe(1.5, &config);
        assert!((state.current_lr - 1e-6).abs() < 1e-12);

        // At the floor the scheduler stops reducing
        state.observe(1.5, &config);
        state.observe(1.5, &config);
        assert!((state.current_lr - 1e-6).abs() < 1e-12);
    }

    #[test]
    fn test_early_stop_after_patience() {
        let config = config();
        let mut state = TrainingState::new(config.learning_rate);

        state.observe(1.0, &config);
        assert!(!state.observe(1.2, &config).stop);
        assert!(!state.observe(1.2, &config).stop);
        assert!(state.observe(1.2, &config).stop);
    }

    #[test]
    fn test_validate_runs_on_trainer_device() {
        use crate::backend::TrainingBackend;
        use crate::model::config::{ArchVariant, ModelConfig, Normalization};
        use crate::model::TarantulaClassifier;

        let tmp = tempfile::tempdir().unwrap();
        for class in ["aphonopelma_seemanni", "brachypelma_hamorii"] {
            let dir = tmp.path().join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2u8 {
                image::RgbImage::from_pixel(16, 16, image::Rgb([i * 90, 120, 200]))
                    .save(dir.join(format!("img_{}.png", i)))
                    .unwrap();
            }
        }
        let dataset = SpeciesDataset::from_dir(tmp.path(), 16).unwrap();

        let device = Default::default();
        let mut model_config = ModelConfig::scratch(2);
        model_config.base_filters = 4;
        model_config.hidden_size = 8;
        let model = TarantulaClassifier::<TrainingBackend>::new(&model_config, &device);

        let meta = CheckpointMeta::new(
            ArchVariant::Scratch,
            16,
            Normalization::Rescale,
            dataset.catalog().clone(),
        );
        let train_config = TrainingConfig {
            batch_size: 2,
            ..TrainingConfig::default()
        };
        let trainer = Trainer::<TrainingBackend, _>::new(
            model,
            train_config,
            meta,
            tmp.path().join("ckpt"),
            device,
        );

        // The full pass must run on the device the trainer was built with
        // and come back with finite metrics.
        let batcher = SpeciesBatcher::new(16, Normalization::Rescale);
        let (loss, accuracy) = trainer.validate(&dataset, &batcher).unwrap();
        assert!(loss.is_finite());
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_improvement_resets_early_stop_counter() {
        let config = config();
        let mut state = TrainingState::new(config.learning_rate);

        state.observe(1.0, &config);
        state.observe(1.2, &config);
        state.observe(1.2, &config);
        assert!(!state.observe(0.9, &config).stop);
        assert_eq!(state.epochs_without_improvement, 0);
    }
}
