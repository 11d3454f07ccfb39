//! Evaluation reports
//!
//! Per-class error ranking and the two CSV reports written after a test
//! pass: `errors_per_class.csv` (every class, ranked by error count) and
//! `test_errors_only.csv` (one row per misclassified image).

use std::cmp::Reverse;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::confusion::ConfusionMatrix;
use crate::dataset::SpeciesCatalog;
use crate::utils::error::{Error, Result};

/// One row of the per-class error ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassErrorRank {
    pub species: String,
    pub errors: usize,
}

/// One misclassified test image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MisclassifiedSample {
    pub file_path: String,
    pub true_class: usize,
    pub pred_class: usize,
    pub true_label: String,
    pub pred_label: String,
}

/// Rank classes by error count, descending.
///
/// The sort is stable, so classes with equal error counts keep their
/// catalog order and the ranking is reproducible run to run.
pub fn rank_class_errors(
    matrix: &ConfusionMatrix,
    catalog: &SpeciesCatalog,
) -> Result<Vec<ClassErrorRank>> {
    if catalog.len() != matrix.num_classes() {
        return Err(Error::Dataset(format!(
            "catalog has {} classes but matrix has {}",
            catalog.len(),
            matrix.num_classes()
        )));
    }

    let errors = matrix.errors_per_class();
    let mut ranks: Vec<ClassErrorRank> = catalog
        .names()
        .iter()
        .zip(errors)
        .map(|(name, errors)| ClassErrorRank {
            species: name.clone(),
            errors,
        })
        .collect();

    ranks.sort_by_key(|r| Reverse(r.errors));
    Ok(ranks)
}

/// Write the ranked per-class error report.
pub fn write_errors_per_class(path: &Path, ranks: &[ClassErrorRank]) -> Result<()> {
    let mut csv = String::from("species,errors\n");
    for rank in ranks {
        csv.push_str(&format!("{},{}\n", rank.species, rank.errors));
    }
    std::fs::write(path, csv)?;
    Ok(())
}

/// Write the misclassified-samples report.
pub fn write_errors_only(path: &Path, samples: &[MisclassifiedSample]) -> Result<()> {
    let mut csv = String::from("file_path,true_class,pred_class,true_label,pred_label\n");
    for s in samples {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            s.file_path, s.true_class, s.pred_class, s.true_label, s.pred_label
        ));
    }
    std::fs::write(path, csv)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SpeciesCatalog {
        SpeciesCatalog::new(vec![
            "avicularia".to_string(),
            "brachypelma".to_string(),
            "grammostola".to_string(),
            "theraphosa".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_ranking_descending_with_stable_ties() {
        let catalog = catalog();
        let mut m = ConfusionMatrix::new(4);
        // avicularia: 1 error, brachypelma: 2, grammostola: 1, theraphosa: 0
        m.add(0, 1).unwrap();
        m.add(0, 0).unwrap();
        m.add(1, 0).unwrap();
        m.add(1, 2).unwrap();
        m.add(2, 3).unwrap();
        m.add(3, 3).unwrap();

        let ranks = rank_class_errors(&m, &catalog).unwrap();
        let names: Vec<&str> = ranks.iter().map(|r| r.species.as_str()).collect();

        // Ties on 1 error keep catalog order: avicularia before grammostola
        assert_eq!(
            names,
            vec!["brachypelma", "avicularia", "grammostola", "theraphosa"]
        );
        assert_eq!(ranks[0].errors, 2);
        assert_eq!(ranks[3].errors, 0);
    }

    #[test]
    fn test_errors_per_class_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("errors_per_class.csv");

        let ranks = vec![
            ClassErrorRank {
                species: "theraphosa_blondi".to_string(),
                errors: 3,
            },
            ClassErrorRank {
                species: "avicularia_avicularia".to_string(),
                errors: 0,
            },
        ];
        write_errors_per_class(&path, &ranks).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "species,errors");
        assert_eq!(lines[1], "theraphosa_blondi,3");
        assert_eq!(lines[2], "avicularia_avicularia,0");
    }

    #[test]
    fn test_errors_only_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_errors_only.csv");

        let samples = vec![MisclassifiedSample {
            file_path: "test/grammostola_rosea/img_01.jpg".to_string(),
            true_class: 2,
            pred_class: 0,
            true_label: "grammostola_rosea".to_string(),
            pred_label: "avicularia_avicularia".to_string(),
        }];
        write_errors_only(&path, &samples).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "file_path,true_class,pred_class,true_label,pred_label"
        );
        assert_eq!(
            lines[1],
            "test/grammostola_rosea/img_01.jpg,2,0,grammostola_rosea,avicularia_avicularia"
        );
    }

    #[test]
    fn test_ranking_rejects_mismatched_catalog() {
        let m = ConfusionMatrix::new(2);
        assert!(rank_class_errors(&m, &catalog()).is_err());
    }
}
