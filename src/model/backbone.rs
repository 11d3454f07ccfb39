//! Transfer-learning backbone
//!
//! A stack of convolutional stages whose weights can be loaded from a
//! pretrained record, with a prefix-freeze operation so fine-tuning can
//! unfreeze only the later stages. The classification head mirrors the
//! from-scratch model: global average pooling, a 512-wide dense layer with
//! dropout, and a final linear layer sized to the catalog.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    record::{CompactRecorder, Recorder},
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use super::cnn::ConvBlock;
use super::config::ModelConfig;
use super::Classifier;
use crate::utils::error::{Error, Result};

/// Convolutional feature extractor: one pooled ConvBlock per stage.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub stages: Vec<ConvBlock<B>>,
}

impl<B: Backend> Backbone<B> {
    /// Build stages from a filter ladder, e.g. [32, 64, 128, 256, 512].
    pub fn new(stage_filters: &[usize], kernel_size: usize, device: &B::Device) -> Self {
        let mut stages = Vec::with_capacity(stage_filters.len());
        let mut in_channels = 3;
        for &out_channels in stage_filters {
            stages.push(ConvBlock::new(
                in_channels,
                out_channels,
                kernel_size,
                true,
                device,
            ));
            in_channels = out_channels;
        }
        Self { stages }
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Forward through all stages
    pub fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 4> {
        for stage in &self.stages {
            x = stage.forward(x);
        }
        x
    }

    /// Exclude stages `0..cutoff` from gradient updates.
    ///
    /// A cutoff of 0 leaves everything trainable; a cutoff >= num_stages
    /// freezes the whole backbone.
    pub fn freeze_prefix(self, cutoff: usize) -> Self {
        let stages = self
            .stages
            .into_iter()
            .enumerate()
            .map(|(idx, stage)| {
                if idx < cutoff {
                    stage.no_grad()
                } else {
                    stage
                }
            })
            .collect();
        Self { stages }
    }
}

/// Classifier built on a (possibly pretrained) backbone
#[derive(Module, Debug)]
pub struct BackboneClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> BackboneClassifier<B> {
    /// Create a new classifier from configuration with random weights.
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let backbone = Backbone::new(&config.backbone_filters, config.kernel_size, device);
        let feature_width = *config.backbone_filters.last().unwrap_or(&config.base_filters);

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc1 = LinearConfig::new(feature_width, config.hidden_size).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();
        let fc2 = LinearConfig::new(config.hidden_size, config.num_classes).init(device);

        Self {
            backbone,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Replace the backbone weights with a pretrained record.
    pub fn load_backbone_weights(mut self, path: &Path, device: &B::Device) -> Result<Self> {
        info!("Loading pretrained backbone from {:?}", path);
        let recorder = CompactRecorder::new();
        let record: BackboneRecord<B> = recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| Error::Model(format!("failed to load backbone weights: {:?}", e)))?;
        self.backbone = self.backbone.load_record(record);
        Ok(self)
    }

    /// Freeze the first `cutoff` backbone stages; the head stays trainable.
    pub fn freeze_prefix(mut self, cutoff: usize) -> Self {
        info!(
            "Freezing backbone stages 0..{} of {}",
            cutoff.min(self.backbone.num_stages()),
            self.backbone.num_stages()
        );
        self.backbone = self.backbone.freeze_prefix(cutoff);
        self
    }

    pub fn num_stages(&self) -> usize {
        self.backbone.num_stages()
    }
}

impl<B: Backend> Classifier<B> for BackboneClassifier<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.backbone.forward(x);
        let x = self.global_pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
