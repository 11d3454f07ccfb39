//! From-scratch CNN for tarantula species classification
//!
//! Four convolutional blocks with doubling filter counts (32 -> 256),
//! BatchNorm and ReLU after each convolution, 2x2 max pooling between
//! blocks, global average pooling, and a 512-wide dense head with dropout.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::ModelConfig;
use super::Classifier;

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Tarantula species classifier trained from scratch
#[derive(Module, Debug)]
pub struct TarantulaClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> TarantulaClassifier<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let base = config.base_filters;
        let k = config.kernel_size;

        // Convolutional blocks: 3 -> 32 -> 64 -> 128 -> 256
        let conv1 = ConvBlock::new(3, base, k, true, device); // 224 -> 112
        let conv2 = ConvBlock::new(base, base * 2, k, true, device); // 112 -> 56
        let conv3 = ConvBlock::new(base * 2, base * 4, k, true, device); // 56 -> 28
        let conv4 = ConvBlock::new(base * 4, base * 8, k, true, device); // 28 -> 14

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let fc1 = LinearConfig::new(base * 8, config.hidden_size).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();
        let fc2 = LinearConfig::new(config.hidden_size, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            conv4,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }
}

impl<B: Backend> Classifier<B> for TarantulaClassifier<B> {
    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        // Global pooling: [B, C, H, W] -> [B, C, 1, 1]
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    #[test]
    fn test_classifier_output_shape() {
        let device = Default::default();
        let config = ModelConfig::scratch(101);
        let model = TarantulaClassifier::<DefaultBackend>::new(&config, &device);

        // Small spatial size keeps the test fast; the network is
        // resolution-agnostic thanks to global pooling.
        let input = Tensor::<DefaultBackend, 4>::zeros([2, 3, 64, 64], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 101]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let config = ModelConfig::scratch(7);
        let model = TarantulaClassifier::<DefaultBackend>::new(&config, &device);

        let input = Tensor::<DefaultBackend, 4>::ones([1, 3, 32, 32], &device);
        let probs = model.forward_probs(input);
        let sum: f32 = probs.sum().into_data().to_vec::<f32>().unwrap()[0];

        assert!((sum - 1.0).abs() < 1e-4);
    }
}
