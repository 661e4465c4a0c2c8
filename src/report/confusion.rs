use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EmotionError, Result};

/// Rows are true classes, columns predicted classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    class_names: Vec<String>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(class_names: Vec<String>) -> Self {
        let n = class_names.len();
        Self {
            class_names,
            counts: vec![vec![0; n]; n],
        }
    }

    pub fn from_predictions(
        class_names: Vec<String>,
        labels: &[usize],
        predictions: &[usize],
    ) -> Result<Self> {
        if labels.len() != predictions.len() {
            return Err(EmotionError::Configuration(format!(
                "{} labels but {} predictions",
                labels.len(),
                predictions.len()
            )));
        }

        let mut matrix = Self::new(class_names);
        for (&truth, &predicted) in labels.iter().zip(predictions) {
            matrix.add(truth, predicted)?;
        }
        Ok(matrix)
    }

    pub fn add(&mut self, truth: usize, predicted: usize) -> Result<()> {
        let n = self.num_classes();
        if truth >= n || predicted >= n {
            return Err(EmotionError::Configuration(format!(
                "class index out of range: true {truth}, predicted {predicted}, {n} classes"
            )));
        }
        self.counts[truth][predicted] += 1;
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.counts
            .get(truth)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn accuracy(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return f32::NAN;
        }
        let correct: usize = (0..self.num_classes()).map(|i| self.counts[i][i]).sum();
        correct as f32 / total as f32
    }

    /// Fraction of each true class predicted correctly; `None` for classes absent from the data.
    pub fn recall(&self) -> Vec<Option<f32>> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let support: usize = row.iter().sum();
                (support > 0).then(|| row[i] as f32 / support as f32)
            })
            .collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .class_names
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(6);

        write!(f, "{:>width$}", "")?;
        for name in &self.class_names {
            write!(f, " {name:>width$}")?;
        }
        writeln!(f)?;

        for (name, row) in self.class_names.iter().zip(&self.counts) {
            write!(f, "{name:>width$}")?;
            for count in row {
                write!(f, " {count:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["Angry".into(), "Happy".into(), "Sad".into()]
    }

    #[test]
    fn test_counts_rows_true_columns_predicted() {
        let labels = [0, 0, 1, 1, 2, 2];
        let predictions = [0, 1, 1, 1, 0, 2];
        let cm = ConfusionMatrix::from_predictions(names(), &labels, &predictions).unwrap();

        assert_eq!(cm.get(0, 1), 1);
        assert_eq!(cm.get(2, 0), 1);
        assert_eq!(cm.get(1, 1), 2);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.max_count(), 2);
        assert!((cm.accuracy() - 4.0 / 6.0).abs() < 1e-6);
        assert_eq!(cm.recall(), vec![Some(0.5), Some(1.0), Some(0.5)]);
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        assert!(ConfusionMatrix::from_predictions(names(), &[3], &[0]).is_err());
        assert!(ConfusionMatrix::from_predictions(names(), &[0, 1], &[0]).is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let cm = ConfusionMatrix::new(names());
        assert!(cm.accuracy().is_nan());
        assert_eq!(cm.recall(), vec![None, None, None]);
        assert!(cm.to_string().contains("Happy"));
    }
}
