//! Inference predictor
//!
//! Loads a persisted checkpoint once per process and serves single-image
//! predictions. The checkpoint's metadata drives every preprocessing
//! decision (resolution, normalization, label catalog), so serving can
//! never drift from how the model was trained. Startup fails loudly when
//! the catalog length does not match the model's output width.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor, TensorData},
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::links::tarantupedia_link;
use crate::dataset::SpeciesCatalog;
use crate::model::{
    ArchVariant, BackboneClassifier, Classifier, ModelConfig, TarantulaClassifier,
};
use crate::training::CheckpointMeta;
use crate::utils::error::{Error, Result};

/// A loaded classifier of either architecture
pub enum SpeciesModel<B: Backend> {
    Scratch(TarantulaClassifier<B>),
    Transfer(BackboneClassifier<B>),
}

impl<B: Backend> SpeciesModel<B> {
    /// Rebuild the architecture described by checkpoint metadata and load
    /// its weights.
    pub fn load(meta: &CheckpointMeta, stem: &Path, device: &B::Device) -> Result<Self> {
        let config = ModelConfig::for_variant(meta.variant, meta.num_classes);
        config.validate()?;

        let recorder = CompactRecorder::new();
        let model = match meta.variant {
            ArchVariant::Scratch => {
                let model = TarantulaClassifier::<B>::new(&config, device)
                    .load_file(stem, &recorder, device)
                    .map_err(|e| Error::Model(format!("failed to load checkpoint: {:?}", e)))?;
                SpeciesModel::Scratch(model)
            }
            ArchVariant::Transfer => {
                let model = BackboneClassifier::<B>::new(&config, device)
                    .load_file(stem, &recorder, device)
                    .map_err(|e| Error::Model(format!("failed to load checkpoint: {:?}", e)))?;
                SpeciesModel::Transfer(model)
            }
        };
        Ok(model)
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            SpeciesModel::Scratch(m) => m.forward(images),
            SpeciesModel::Transfer(m) => m.forward(images),
        }
    }

    pub fn forward_probs(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            SpeciesModel::Scratch(m) => m.forward_probs(images),
            SpeciesModel::Transfer(m) => m.forward_probs(images),
        }
    }

    pub fn num_classes(&self) -> usize {
        match self {
            SpeciesModel::Scratch(m) => m.num_classes(),
            SpeciesModel::Transfer(m) => m.num_classes(),
        }
    }
}

/// One entry of the top-k ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopPrediction {
    pub class_id: usize,
    pub species: String,
    pub confidence: f32,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,
    /// Predicted class id
    pub class_id: usize,
    /// Predicted species name
    pub species: String,
    /// Probability of the predicted class
    pub confidence: f32,
    /// Tarantupedia reference URL for the predicted species
    pub tarantupedia_link: String,
    /// Top-5 predictions
    pub top_k: Vec<TopPrediction>,
    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    fn from_probabilities(
        probabilities: &[f32],
        catalog: &SpeciesCatalog,
        elapsed_ms: f64,
    ) -> Result<Self> {
        let mut indexed: Vec<(usize, f32)> = probabilities
            .iter()
            .copied()
            .enumerate()
            .collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        let &(class_id, confidence) = indexed
            .first()
            .ok_or_else(|| Error::Inference("empty probability vector".to_string()))?;

        let species = catalog
            .name(class_id)
            .ok_or_else(|| Error::Inference(format!("class {} not in catalog", class_id)))?
            .to_string();

        let top_k = indexed
            .iter()
            .take(5)
            .map(|&(id, confidence)| {
                let species = catalog
                    .name(id)
                    .ok_or_else(|| Error::Inference(format!("class {} not in catalog", id)))?
                    .to_string();
                Ok(TopPrediction {
                    class_id: id,
                    species,
                    confidence,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            image_path: None,
            class_id,
            confidence,
            tarantupedia_link: tarantupedia_link(&species),
            species,
            top_k,
            inference_time_ms: elapsed_ms,
        })
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.species, self.class_id
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));
        output.push_str(&format!("Reference: {}\n", self.tarantupedia_link));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output.push_str("\nTop-5 predictions:\n");
        for (i, p) in self.top_k.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} (class {}) - {:.2}%\n",
                i + 1,
                p.species,
                p.class_id,
                p.confidence * 100.0
            ));
        }

        output
    }
}

/// Predictor for serving a trained checkpoint
pub struct Predictor<B: Backend> {
    model: SpeciesModel<B>,
    meta: CheckpointMeta,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Load a checkpoint (weights + metadata) and verify its integrity.
    pub fn load(checkpoint_stem: &Path, device: B::Device) -> Result<Self> {
        let meta = CheckpointMeta::load(checkpoint_stem)?;
        let model = SpeciesModel::<B>::load(&meta, checkpoint_stem, &device)?;

        if model.num_classes() != meta.catalog.len() {
            return Err(Error::Integrity(format!(
                "model outputs {} classes but catalog lists {}; refusing to serve",
                model.num_classes(),
                meta.catalog.len()
            )));
        }

        info!(
            "Loaded {} model ({} classes, {}x{} input)",
            meta.variant,
            meta.catalog.len(),
            meta.input_size,
            meta.input_size
        );

        Ok(Self {
            model,
            meta,
            device,
        })
    }

    pub fn catalog(&self) -> &SpeciesCatalog {
        &self.meta.catalog
    }

    pub fn input_size(&self) -> usize {
        self.meta.input_size
    }

    pub fn variant(&self) -> ArchVariant {
        self.meta.variant
    }

    /// Resize and normalize one image into a [1, 3, H, W] input tensor.
    ///
    /// Resizing goes through the same helper the dataset loader uses, so a
    /// served image sees exactly the pixels a validation pass would.
    fn preprocess(&self, image: &DynamicImage) -> Tensor<B, 4> {
        let size = self.meta.input_size;
        let rgb = crate::dataset::resize_to_input(image, size);

        let num_pixels = size * size;
        let mut pixels = vec![0.0f32; 3 * num_pixels];
        for (i, pixel) in rgb.pixels().enumerate() {
            pixels[i] = self.meta.normalization.apply(pixel[0] as f32);
            pixels[num_pixels + i] = self.meta.normalization.apply(pixel[1] as f32);
            pixels[2 * num_pixels + i] = self.meta.normalization.apply(pixel[2] as f32);
        }

        let data = TensorData::new(pixels, [1, 3, size, size]);
        Tensor::from_data(data, &self.device)
    }

    /// Predict on a decoded image.
    pub fn predict_image(&self, image: &DynamicImage) -> Result<PredictionResult> {
        let start = Instant::now();

        let input = self.preprocess(image);
        let probs = self.model.forward_probs(input);
        let probabilities: Vec<f32> = probs
            .into_data()
            .to_vec()
            .map_err(|e| Error::Inference(format!("failed to read probabilities: {:?}", e)))?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        PredictionResult::from_probabilities(&probabilities, &self.meta.catalog, elapsed_ms)
    }

    /// Predict on raw encoded image bytes (jpg/jpeg/png).
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| Error::Inference(format!("cannot decode image: {}", e)))?;
        self.predict_image(&image)
    }

    /// Predict on an image file.
    pub fn predict_file(&self, path: &Path) -> Result<PredictionResult> {
        let image = image::open(path)
            .map_err(|e| Error::ImageLoad(path.to_path_buf(), e.to_string()))?;
        let mut result = self.predict_image(&image)?;
        result.image_path = Some(path.to_path_buf());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SpeciesCatalog {
        SpeciesCatalog::new(vec![
            "avicularia_avicularia".to_string(),
            "poecilotheria_metallica".to_string(),
            "theraphosa_blondi".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_result_from_probabilities() {
        let probs = vec![0.1, 0.7, 0.2];
        let result = PredictionResult::from_probabilities(&probs, &catalog(), 12.5).unwrap();

        assert_eq!(result.class_id, 1);
        assert_eq!(result.species, "poecilotheria_metallica");
        assert!((result.confidence - 0.7).abs() < 1e-6);
        assert_eq!(
            result.tarantupedia_link,
            "https://www.tarantupedia.com/theraphosinae/poecilotheria/poecilotheria-metallica"
        );
        // Top-k is capped at the class count here
        assert_eq!(result.top_k.len(), 3);
        assert_eq!(result.top_k[0].class_id, 1);
        assert_eq!(result.top_k[1].class_id, 2);
    }

    #[test]
    fn test_empty_probabilities_rejected() {
        assert!(PredictionResult::from_probabilities(&[], &catalog(), 0.0).is_err());
    }

    #[test]
    fn test_out_of_catalog_class_rejected() {
        // 4 probabilities against a 3-entry catalog
        let probs = vec![0.1, 0.1, 0.1, 0.7];
        assert!(PredictionResult::from_probabilities(&probs, &catalog(), 0.0).is_err());
    }
}
