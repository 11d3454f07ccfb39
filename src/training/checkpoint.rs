//! Checkpoint metadata
//!
//! A checkpoint is a pair of sibling files sharing a stem: `<stem>.mpk`
//! (model weights via `CompactRecorder`) and `<stem>.json` (metadata).
//! The metadata embeds the full species catalog so a model can never be
//! served against a label list it was not trained with.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::dataset::SpeciesCatalog;
use crate::model::config::{ArchVariant, Normalization};
use crate::utils::error::{Error, Result};

/// Metadata written next to every saved model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Architecture the weights belong to
    pub variant: ArchVariant,
    /// Square input resolution used in training
    pub input_size: usize,
    /// Pixel normalization used in training
    pub normalization: Normalization,
    /// Ordered label list (position = class id)
    pub catalog: SpeciesCatalog,
    /// Width of the classification head
    pub num_classes: usize,
    /// Validation loss at save time
    pub val_loss: f64,
    /// Epoch (1-indexed) the checkpoint was written at
    pub epoch: usize,
    /// RFC 3339 save timestamp
    pub timestamp: String,
}

impl CheckpointMeta {
    /// Prototype metadata for a training run; `val_loss` and `epoch` are
    /// filled in at each save.
    pub fn new(
        variant: ArchVariant,
        input_size: usize,
        normalization: Normalization,
        catalog: SpeciesCatalog,
    ) -> Self {
        let num_classes = catalog.len();
        Self {
            variant,
            input_size,
            normalization,
            catalog,
            num_classes,
            val_loss: f64::INFINITY,
            epoch: 0,
            timestamp: String::new(),
        }
    }

    /// Metadata file path for a checkpoint stem
    pub fn meta_path(stem: &Path) -> PathBuf {
        let mut path = stem.as_os_str().to_owned();
        path.push(".json");
        PathBuf::from(path)
    }

    /// Weights file path for a checkpoint stem (written by CompactRecorder)
    pub fn weights_path(stem: &Path) -> PathBuf {
        let mut path = stem.as_os_str().to_owned();
        path.push(".mpk");
        PathBuf::from(path)
    }

    /// Write metadata for a save at the given epoch.
    pub fn save(&self, stem: &Path, val_loss: f64, epoch: usize) -> Result<()> {
        let mut meta = self.clone();
        meta.val_loss = val_loss;
        meta.epoch = epoch;
        meta.timestamp = Utc::now().to_rfc3339();

        let json = serde_json::to_string_pretty(&meta)?;
        std::fs::write(Self::meta_path(stem), json)?;
        Ok(())
    }

    /// Load metadata for a checkpoint stem.
    pub fn load(stem: &Path) -> Result<Self> {
        let path = Self::meta_path(stem);
        if !path.exists() {
            return Err(Error::PathNotFound(path));
        }
        let json = std::fs::read_to_string(&path)?;
        let mut meta: Self = serde_json::from_str(&json)?;
        meta.catalog.rebuild_index();

        if meta.catalog.len() != meta.num_classes {
            return Err(Error::Integrity(format!(
                "checkpoint metadata lists {} classes but catalog has {}",
                meta.num_classes,
                meta.catalog.len()
            )));
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SpeciesCatalog {
        SpeciesCatalog::new(vec![
            "grammostola_rosea".to_string(),
            "poecilotheria_metallica".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_meta_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let stem = tmp.path().join("model_best");

        let meta = CheckpointMeta::new(
            ArchVariant::Scratch,
            224,
            Normalization::Rescale,
            catalog(),
        );
        meta.save(&stem, 1.25, 7).unwrap();

        let loaded = CheckpointMeta::load(&stem).unwrap();
        assert_eq!(loaded.num_classes, 2);
        assert_eq!(loaded.epoch, 7);
        assert!((loaded.val_loss - 1.25).abs() < 1e-9);
        assert_eq!(loaded.catalog.id("poecilotheria_metallica"), Some(1));
    }

    #[test]
    fn test_meta_paths() {
        let stem = Path::new("output/models/tarantula_best");
        assert_eq!(
            CheckpointMeta::meta_path(stem),
            PathBuf::from("output/models/tarantula_best.json")
        );
        assert_eq!(
            CheckpointMeta::weights_path(stem),
            PathBuf::from("output/models/tarantula_best.mpk")
        );
    }

    #[test]
    fn test_tampered_class_count_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let stem = tmp.path().join("model");
        let meta = CheckpointMeta::new(
            ArchVariant::Transfer,
            299,
            Normalization::Signed,
            catalog(),
        );
        meta.save(&stem, 0.5, 1).unwrap();

        // Corrupt the class count on disk
        let path = CheckpointMeta::meta_path(&stem);
        let json = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, json.replace("\"num_classes\": 2", "\"num_classes\": 3")).unwrap();

        assert!(matches!(
            CheckpointMeta::load(&stem),
            Err(Error::Integrity(_))
        ));
    }
}
