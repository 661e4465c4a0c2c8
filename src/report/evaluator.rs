use burn::prelude::*;
use image::RgbImage;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::confusion::ConfusionMatrix;
use crate::dataset::Partition;
use crate::error::Result;
use crate::model::EmotionNet;
use crate::training::checkpoint::{load_checkpoint, CheckpointMetadata};
use crate::training::metrics::{argmax, evaluate_partition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub class_names: Vec<String>,
    pub checkpoint_epoch: usize,
    pub checkpoint_val_accuracy: f32,
    pub test_samples: usize,
    pub test_loss: f32,
    pub test_accuracy: f32,
    pub confusion_matrix: ConfusionMatrix,
}

impl EvaluationReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// One test image with the model's output for it.
#[derive(Debug, Clone)]
pub struct SamplePrediction {
    pub index: usize,
    pub image: RgbImage,
    pub true_label: usize,
    pub predicted: usize,
    pub probabilities: Vec<f32>,
}

/// Test-set predictions of a restored checkpoint.
pub struct Evaluation {
    pub report: EvaluationReport,
    pub probabilities: Vec<Vec<f32>>,
}

impl Evaluation {
    /// `count` distinct test samples chosen with `seed`.
    pub fn samples(&self, partition: &Partition, count: usize, seed: u64) -> Vec<SamplePrediction> {
        let available = partition.len().min(self.probabilities.len());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        index::sample(&mut rng, available, count.min(available))
            .into_iter()
            .map(|i| SamplePrediction {
                index: i,
                image: partition.images[i].clone(),
                true_label: partition.labels[i],
                predicted: argmax(&self.probabilities[i]),
                probabilities: self.probabilities[i].clone(),
            })
            .collect()
    }
}

/// Reloads the best checkpoint and scores held-out data with it.
pub struct Evaluator<B: Backend> {
    model: EmotionNet<B>,
    metadata: CheckpointMetadata,
    device: B::Device,
}

impl<B: Backend> Evaluator<B> {
    pub fn from_checkpoint(stem: &Path, device: B::Device) -> Result<Self> {
        let (model, metadata) = load_checkpoint::<B>(stem, &device)?;
        log::info!(
            "Loaded checkpoint from epoch {} (val_accuracy {:.4})",
            metadata.epoch,
            metadata.val_accuracy
        );
        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    pub fn evaluate(&self, partition: &Partition, batch_size: usize) -> Result<Evaluation> {
        let (metrics, probabilities) =
            evaluate_partition(&self.model, partition, batch_size, &self.device)?;

        let predictions: Vec<usize> = probabilities.iter().map(|row| argmax(row)).collect();
        let confusion_matrix = ConfusionMatrix::from_predictions(
            self.metadata.classes.names().to_vec(),
            &partition.labels,
            &predictions,
        )?;

        log::info!(
            "Test loss: {:.4} | Test accuracy: {:.2}%",
            metrics.loss,
            metrics.accuracy * 100.0
        );

        Ok(Evaluation {
            report: EvaluationReport {
                class_names: self.metadata.classes.names().to_vec(),
                checkpoint_epoch: self.metadata.epoch,
                checkpoint_val_accuracy: self.metadata.val_accuracy,
                test_samples: partition.len(),
                test_loss: metrics.loss,
                test_accuracy: metrics.accuracy,
                confusion_matrix,
            },
            probabilities,
        })
    }
}
