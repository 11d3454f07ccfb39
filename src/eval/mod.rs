//! Test-set evaluation
//!
//! Runs a checkpoint over a held-out directory in deterministic order,
//! accumulates a confusion matrix, and writes three reports next to it:
//! `confusion_matrix.csv`, `errors_per_class.csv` (classes ranked by error
//! count) and `test_errors_only.csv` (one row per misclassified image).

pub mod confusion;
pub mod report;

pub use confusion::ConfusionMatrix;
pub use report::{ClassErrorRank, MisclassifiedSample};

use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::backend::Backend,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::{EpochPlan, SpeciesBatcher, SpeciesDataset, SpeciesItem};
use crate::inference::SpeciesModel;
use crate::training::CheckpointMeta;
use crate::utils::error::{Error, Result};

/// Summary of one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// Images that failed to decode and were left out of the matrix
    pub skipped: usize,
    pub ranks: Vec<ClassErrorRank>,
    pub misclassified: Vec<MisclassifiedSample>,
}

/// Evaluate a checkpoint on a test directory
///
/// # Arguments
/// * `checkpoint_stem` - Checkpoint to evaluate (`<stem>.mpk` + `<stem>.json`)
/// * `test_dir` - Directory with one subdirectory per species
/// * `output_dir` - Where the CSV reports are written
pub fn run_evaluation<B: Backend>(
    checkpoint_stem: &Path,
    test_dir: &str,
    output_dir: &str,
    batch_size: usize,
) -> Result<EvalReport> {
    println!("{}", "Initializing Evaluation...".green().bold());

    let device = B::Device::default();
    let meta = CheckpointMeta::load(checkpoint_stem)?;
    let model = SpeciesModel::<B>::load(&meta, checkpoint_stem, &device)?;

    if model.num_classes() != meta.catalog.len() {
        return Err(Error::Integrity(format!(
            "model outputs {} classes but catalog lists {}",
            model.num_classes(),
            meta.catalog.len()
        )));
    }

    println!("{}", "Loading Test Set...".cyan());
    let dataset = SpeciesDataset::from_dir(test_dir, meta.input_size)?;
    if dataset.catalog().names() != meta.catalog.names() {
        return Err(Error::Integrity(format!(
            "test label space ({} classes) does not match checkpoint catalog ({} classes)",
            dataset.catalog().len(),
            meta.catalog.len()
        )));
    }

    std::fs::create_dir_all(output_dir)?;
    let catalog = &meta.catalog;
    let batcher = SpeciesBatcher::new(meta.input_size, meta.normalization);

    info!(
        "Evaluating {} samples across {} classes",
        dataset.len(),
        catalog.len()
    );

    let mut matrix = ConfusionMatrix::new(catalog.len());
    let mut misclassified: Vec<MisclassifiedSample> = Vec::new();
    let mut skipped = 0usize;

    // Deterministic order: predictions stay aligned to sample indices even
    // when a corrupt file drops out of a batch.
    let plan = EpochPlan::ordered(dataset.len(), batch_size);
    for batch_indices in plan.batches() {
        let mut indexed: Vec<(usize, SpeciesItem)> = Vec::with_capacity(batch_indices.len());
        for &idx in batch_indices {
            use burn::data::dataset::Dataset;
            match dataset.get(idx) {
                Some(item) => indexed.push((idx, item)),
                None => skipped += 1,
            }
        }
        if indexed.is_empty() {
            continue;
        }

        let items: Vec<SpeciesItem> = indexed.iter().map(|(_, item)| item.clone()).collect();
        let batch = batcher.batch(items, &device);

        let output = model.forward(batch.images);
        let predictions: Vec<i64> = output
            .argmax(1)
            .squeeze::<1>(1)
            .into_data()
            .to_vec()
            .map_err(|e| Error::Inference(format!("failed to read predictions: {:?}", e)))?;

        for ((sample_idx, _), &pred) in indexed.iter().zip(predictions.iter()) {
            let sample = dataset
                .sample(*sample_idx)
                .ok_or_else(|| Error::Dataset(format!("sample {} vanished", sample_idx)))?;
            let pred = pred as usize;
            matrix.add(sample.label, pred)?;

            if pred != sample.label {
                let pred_label = catalog
                    .name(pred)
                    .ok_or_else(|| {
                        Error::Inference(format!("predicted class {} not in catalog", pred))
                    })?
                    .to_string();
                misclassified.push(MisclassifiedSample {
                    file_path: sample.path.to_string_lossy().to_string(),
                    true_class: sample.label,
                    pred_class: pred,
                    true_label: sample.class_name.clone(),
                    pred_label,
                });
            }
        }
    }

    if skipped > 0 {
        warn!("{} images failed to decode and were skipped", skipped);
    }

    let ranks = report::rank_class_errors(&matrix, catalog)?;

    let output_dir = PathBuf::from(output_dir);
    matrix.save_csv(&output_dir.join("confusion_matrix.csv"), catalog.names())?;
    report::write_errors_per_class(&output_dir.join("errors_per_class.csv"), &ranks)?;
    report::write_errors_only(&output_dir.join("test_errors_only.csv"), &misclassified)?;

    let report = EvalReport {
        total: matrix.total(),
        correct: matrix.correct(),
        accuracy: matrix.accuracy(),
        skipped,
        ranks,
        misclassified,
    };

    println!();
    println!("{}", "Evaluation Complete!".green().bold());
    println!(
        "  Accuracy: {:.2}% ({}/{})",
        report.accuracy * 100.0,
        report.correct,
        report.total
    );
    println!("  Misclassified: {}", report.misclassified.len());
    if report.skipped > 0 {
        println!("  Skipped (corrupt): {}", report.skipped);
    }
    println!("  Reports written to {:?}", output_dir);

    Ok(report)
}
