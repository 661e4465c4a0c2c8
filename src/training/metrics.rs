use burn::prelude::*;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::data::ClassificationBatch;
use crate::dataset::Partition;
use crate::error::{EmotionError, Result};
use crate::model::EmotionNet;

/// Probabilities below this are clipped before taking the log.
const PROB_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionMetrics {
    pub loss: f32,
    pub accuracy: f32,
}

/// Index of the largest value; NaN entries never win.
pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}

/// Mean categorical cross-entropy of probability rows against class indices.
pub fn cross_entropy(probabilities: &[Vec<f32>], labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return f32::NAN;
    }
    let total: f32 = probabilities
        .iter()
        .zip(labels)
        .map(|(row, &label)| {
            let p = row.get(label).copied().unwrap_or(0.0);
            -p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON).ln()
        })
        .sum();
    total / labels.len() as f32
}

pub fn accuracy(probabilities: &[Vec<f32>], labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return f32::NAN;
    }
    let correct = probabilities
        .iter()
        .zip(labels)
        .filter(|(row, &label)| argmax(row) == label)
        .count();
    correct as f32 / labels.len() as f32
}

/// Softmax outputs for `images`, evaluated in chunks of `batch_size`.
pub fn predict_probabilities<B: Backend>(
    model: &EmotionNet<B>,
    images: &[RgbImage],
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<Vec<f32>>> {
    let num_classes = model.num_classes();
    let mut rows = Vec::with_capacity(images.len());

    for chunk in images.chunks(batch_size.max(1)) {
        let labels = vec![0; chunk.len()];
        let batch = ClassificationBatch::<B>::from_images(chunk, &labels, device);
        let probs = model
            .predict_proba(batch.images)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| EmotionError::Tensor(format!("{e:?}")))?;
        rows.extend(probs.chunks(num_classes).map(<[f32]>::to_vec));
    }

    Ok(rows)
}

/// Loss and accuracy over a whole partition, plus the per-sample probabilities.
pub fn evaluate_partition<B: Backend>(
    model: &EmotionNet<B>,
    partition: &Partition,
    batch_size: usize,
    device: &B::Device,
) -> Result<(PartitionMetrics, Vec<Vec<f32>>)> {
    let probabilities = predict_probabilities(model, &partition.images, batch_size, device)?;
    let metrics = PartitionMetrics {
        loss: cross_entropy(&probabilities, &partition.labels),
        accuracy: accuracy(&probabilities, &partition.labels),
    };
    Ok((metrics, probabilities))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use burn::backend::NdArray;
    use image::Rgb;

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
    }

    #[test]
    fn test_accuracy_and_cross_entropy() {
        let probs = vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.6, 0.4]];
        let labels = [0, 1, 1];

        assert!((accuracy(&probs, &labels) - 2.0 / 3.0).abs() < 1e-6);

        let expected = -(0.9f32.ln() + 0.8f32.ln() + 0.4f32.ln()) / 3.0;
        assert!((cross_entropy(&probs, &labels) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_zero_probability_is_clipped() {
        let loss = cross_entropy(&[vec![1.0, 0.0]], &[1]);
        assert!(loss.is_finite());
        assert!(loss > 15.0);
    }

    #[test]
    fn test_predict_probabilities_over_uneven_batches() {
        let device = Default::default();
        let mut config = ModelConfig::new(16, 3);
        config.blocks.truncate(2);
        let model = EmotionNet::<NdArray>::new(&device, &config).unwrap();

        let images: Vec<RgbImage> = (0..5)
            .map(|i| RgbImage::from_pixel(16, 16, Rgb([i * 40, 100, 200])))
            .collect();
        let rows = predict_probabilities(&model, &images, 2, &device).unwrap();

        assert_eq!(rows.len(), 5);
        for row in rows {
            assert_eq!(row.len(), 3);
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }
}
