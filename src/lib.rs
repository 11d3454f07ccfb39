//! # Theraphosid
//!
//! A Rust library for tarantula (Theraphosidae) species classification using
//! the Burn framework. Images organized in one directory per species are
//! turned into a ~100-class image classifier, trained either from scratch or
//! on top of a pretrained convolutional backbone, and served over HTTP.
//!
//! ## Modules
//!
//! - `dataset`: species catalog, directory loader, augmentation, and batching
//! - `model`: CNN architectures built with Burn
//! - `training`: training and fine-tuning drivers with checkpointing
//! - `eval`: confusion matrix and per-class error reports
//! - `inference`: prediction, reference links, and checkpoint fetching
//! - `utils`: errors and logging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use theraphosid::dataset::SpeciesDataset;
//! use theraphosid::model::ModelConfig;
//!
//! let train = SpeciesDataset::from_dir("data/train", 224)?;
//! let config = ModelConfig::scratch(train.catalog().len());
//! // ... training and inference
//! ```

pub mod backend;
pub mod dataset;
pub mod eval;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::batcher::{EpochPlan, SpeciesBatch, SpeciesBatcher};
pub use dataset::catalog::SpeciesCatalog;
pub use dataset::loader::{SpeciesDataset, SpeciesItem};
pub use eval::confusion::ConfusionMatrix;
pub use inference::predictor::{PredictionResult, Predictor};
pub use model::cnn::TarantulaClassifier;
pub use model::config::{ArchVariant, ModelConfig, Normalization};
pub use training::trainer::{Trainer, TrainingState};
pub use training::TrainingConfig;
pub use utils::error::{Error, Result};

/// Default image resolution for the from-scratch architecture
pub const SCRATCH_IMAGE_SIZE: usize = 224;

/// Default image resolution for the transfer-learning architecture
pub const TRANSFER_IMAGE_SIZE: usize = 299;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
