//! Confusion matrix
//!
//! Flat row-major counts indexed [true_class][predicted_class], built
//! incrementally during an evaluation pass.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{Error, Result};

/// Confusion matrix over a fixed label space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    /// Row-major counts: `counts[true * num_classes + pred]`
    counts: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Record one prediction.
    pub fn add(&mut self, true_class: usize, pred_class: usize) -> Result<()> {
        if true_class >= self.num_classes || pred_class >= self.num_classes {
            return Err(Error::Dataset(format!(
                "class out of range: true {} / pred {} with {} classes",
                true_class, pred_class, self.num_classes
            )));
        }
        self.counts[true_class * self.num_classes + pred_class] += 1;
        Ok(())
    }

    pub fn get(&self, true_class: usize, pred_class: usize) -> usize {
        self.counts[true_class * self.num_classes + pred_class]
    }

    /// Total number of recorded predictions
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Samples per true class
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|t| (0..self.num_classes).map(|p| self.get(t, p)).sum())
            .collect()
    }

    /// Predictions per predicted class
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|p| (0..self.num_classes).map(|t| self.get(t, p)).sum())
            .collect()
    }

    /// Misclassified samples per true class (row sum minus diagonal)
    pub fn errors_per_class(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|t| {
                let row: usize = (0..self.num_classes).map(|p| self.get(t, p)).sum();
                row - self.get(t, t)
            })
            .collect()
    }

    /// Write the full matrix as CSV with a labeled header row and column.
    pub fn save_csv(&self, path: &Path, class_names: &[String]) -> Result<()> {
        if class_names.len() != self.num_classes {
            return Err(Error::Dataset(format!(
                "{} class names for a {}-class matrix",
                class_names.len(),
                self.num_classes
            )));
        }

        let mut csv = String::from("true\\pred");
        for name in class_names {
            csv.push(',');
            csv.push_str(name);
        }
        csv.push('\n');

        for (t, name) in class_names.iter().enumerate() {
            csv.push_str(name);
            for p in 0..self.num_classes {
                csv.push(',');
                csv.push_str(&self.get(t, p).to_string());
            }
            csv.push('\n');
        }

        std::fs::write(path, csv)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_accuracy() {
        let mut m = ConfusionMatrix::new(3);
        m.add(0, 0).unwrap();
        m.add(0, 0).unwrap();
        m.add(0, 2).unwrap();
        m.add(1, 1).unwrap();
        m.add(2, 0).unwrap();

        assert_eq!(m.total(), 5);
        assert_eq!(m.correct(), 3);
        assert!((m.accuracy() - 0.6).abs() < 1e-9);
        assert_eq!(m.row_sums(), vec![3, 1, 1]);
        assert_eq!(m.col_sums(), vec![3, 1, 1]);
        assert_eq!(m.errors_per_class(), vec![1, 0, 1]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut m = ConfusionMatrix::new(2);
        assert!(m.add(2, 0).is_err());
        assert!(m.add(0, 5).is_err());
    }

    #[test]
    fn test_csv_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("confusion.csv");

        let mut m = ConfusionMatrix::new(2);
        m.add(0, 1).unwrap();
        m.add(1, 1).unwrap();

        let names = vec!["a".to_string(), "b".to_string()];
        m.save_csv(&path, &names).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "true\\pred,a,b");
        assert_eq!(lines[1], "a,0,1");
        assert_eq!(lines[2], "b,0,1");
    }
}
