//! Model architectures built with Burn.

pub mod backbone;
pub mod cnn;
pub mod config;

pub use backbone::{Backbone, BackboneClassifier};
pub use cnn::TarantulaClassifier;
pub use config::{ArchVariant, ModelConfig, Normalization};

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Common interface over the two classifier architectures.
pub trait Classifier<B: Backend>: Module<B> {
    /// Logits of shape [batch_size, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Softmax probabilities for inference
    fn forward_probs(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }

    /// Width of the classification head
    fn num_classes(&self) -> usize;
}
