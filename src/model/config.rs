//! Model configuration
//!
//! Serializable configuration for both architectures, validated before any
//! model is built and persisted as JSON alongside checkpoints.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{Error, Result};
use crate::{SCRATCH_IMAGE_SIZE, TRANSFER_IMAGE_SIZE};

/// Which architecture to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchVariant {
    /// From-scratch CNN at 224x224
    Scratch,
    /// Pretrained backbone with a new classification head at 299x299
    Transfer,
}

impl ArchVariant {
    /// Default square input resolution for the variant
    pub fn input_size(&self) -> usize {
        match self {
            ArchVariant::Scratch => SCRATCH_IMAGE_SIZE,
            ArchVariant::Transfer => TRANSFER_IMAGE_SIZE,
        }
    }

    /// Input normalization paired with the variant
    pub fn normalization(&self) -> Normalization {
        match self {
            ArchVariant::Scratch => Normalization::Rescale,
            ArchVariant::Transfer => Normalization::Signed,
        }
    }
}

impl std::str::FromStr for ArchVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scratch" => Ok(ArchVariant::Scratch),
            "transfer" => Ok(ArchVariant::Transfer),
            other => Err(Error::Config(format!("unknown architecture '{}'", other))),
        }
    }
}

impl std::fmt::Display for ArchVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchVariant::Scratch => write!(f, "scratch"),
            ArchVariant::Transfer => write!(f, "transfer"),
        }
    }
}

/// Pixel normalization applied in the batcher and at inference.
///
/// Recorded in checkpoint metadata so serving always matches training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// x / 255 into [0, 1]
    Rescale,
    /// x / 127.5 - 1 into [-1, 1]
    Signed,
}

impl Normalization {
    #[inline]
    pub fn apply(&self, value: f32) -> f32 {
        match self {
            Normalization::Rescale => value / 255.0,
            Normalization::Signed => value / 127.5 - 1.0,
        }
    }
}

/// Configuration shared by both classifier architectures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Architecture to build
    pub variant: ArchVariant,
    /// Number of output classes (catalog length)
    pub num_classes: usize,
    /// Square input resolution
    pub input_size: usize,
    /// Base number of convolutional filters (doubled per block)
    pub base_filters: usize,
    /// Convolution kernel side (must be odd for same-padding)
    pub kernel_size: usize,
    /// Width of the dense layer before the classification head
    pub hidden_size: usize,
    /// Dropout rate before the classification head
    pub dropout: f64,
    /// Conv-stage widths of the transfer backbone
    pub backbone_filters: Vec<usize>,
}

impl ModelConfig {
    /// From-scratch configuration with the standard filter ladder.
    pub fn scratch(num_classes: usize) -> Self {
        Self {
            variant: ArchVariant::Scratch,
            num_classes,
            input_size: SCRATCH_IMAGE_SIZE,
            base_filters: 32,
            kernel_size: 3,
            hidden_size: 512,
            dropout: 0.5,
            backbone_filters: Vec::new(),
        }
    }

    /// Transfer-learning configuration.
    pub fn transfer(num_classes: usize) -> Self {
        Self {
            variant: ArchVariant::Transfer,
            num_classes,
            input_size: TRANSFER_IMAGE_SIZE,
            base_filters: 32,
            kernel_size: 3,
            hidden_size: 512,
            dropout: 0.5,
            backbone_filters: vec![32, 64, 128, 256, 512],
        }
    }

    /// Build the config matching a variant.
    pub fn for_variant(variant: ArchVariant, num_classes: usize) -> Self {
        match variant {
            ArchVariant::Scratch => Self::scratch(num_classes),
            ArchVariant::Transfer => Self::transfer(num_classes),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(Error::Config("num_classes must be positive".to_string()));
        }
        if self.kernel_size % 2 == 0 {
            return Err(Error::Config(format!(
                "kernel_size must be odd for same-padding, got {}",
                self.kernel_size
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.input_size < 32 {
            return Err(Error::Config(format!(
                "input_size too small: {}",
                self.input_size
            )));
        }
        if self.variant == ArchVariant::Transfer && self.backbone_filters.is_empty() {
            return Err(Error::Config(
                "transfer variant requires backbone_filters".to_string(),
            ));
        }
        Ok(())
    }

    /// Save to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_defaults_valid() {
        let config = ModelConfig::scratch(101);
        assert!(config.validate().is_ok());
        assert_eq!(config.input_size, 224);
        assert_eq!(config.variant.normalization(), Normalization::Rescale);
    }

    #[test]
    fn test_transfer_defaults_valid() {
        let config = ModelConfig::transfer(101);
        assert!(config.validate().is_ok());
        assert_eq!(config.input_size, 299);
        assert_eq!(config.variant.normalization(), Normalization::Signed);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ModelConfig::scratch(101);
        config.kernel_size = 4;
        assert!(config.validate().is_err());

        let mut config = ModelConfig::scratch(101);
        config.dropout = 1.0;
        assert!(config.validate().is_err());

        let config = ModelConfig::scratch(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normalization_values() {
        assert!((Normalization::Rescale.apply(255.0) - 1.0).abs() < 1e-6);
        assert!((Normalization::Signed.apply(0.0) + 1.0).abs() < 1e-6);
        assert!((Normalization::Signed.apply(127.5)).abs() < 1e-6);
    }

    #[test]
    fn test_config_json_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.json");
        let config = ModelConfig::transfer(96);
        config.save(&path).unwrap();

        let loaded = ModelConfig::load(&path).unwrap();
        assert_eq!(loaded.num_classes, 96);
        assert_eq!(loaded.variant, ArchVariant::Transfer);
    }
}
