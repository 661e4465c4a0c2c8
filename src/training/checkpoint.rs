use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dataset::ClassMapping;
use crate::error::{EmotionError, Result};
use crate::model::{EmotionNet, ModelConfig};

/// Everything needed to rebuild and interpret a saved model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    pub model: ModelConfig,
    pub classes: ClassMapping,
    pub epoch: usize,
    pub val_accuracy: f32,
}

pub fn weights_file(stem: &Path) -> PathBuf {
    stem.with_extension("bin")
}

pub fn metadata_file(stem: &Path) -> PathBuf {
    stem.with_extension("json")
}

/// Saves the model whenever the monitored metric beats every earlier epoch.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    path: PathBuf,
    pub best: f32,
}

impl ModelCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best: f32::NEG_INFINITY,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_improvement(&self, metric: f32) -> bool {
        metric.is_finite() && metric > self.best
    }

    /// Saves if `metric` strictly improves on the best so far; returns whether it did.
    pub fn save_if_best<B: Backend>(
        &mut self,
        model: &EmotionNet<B>,
        metadata: &CheckpointMetadata,
        metric: f32,
    ) -> Result<bool> {
        if !self.is_improvement(metric) {
            return Ok(false);
        }

        let previous = self.best;
        save_checkpoint(&self.path, model, metadata)?;
        self.best = metric;
        log::info!(
            "Epoch {}: val_accuracy improved from {:.4} to {:.4}, saved {}",
            metadata.epoch,
            previous,
            metric,
            weights_file(&self.path).display()
        );
        Ok(true)
    }
}

pub fn save_checkpoint<B: Backend>(
    stem: &Path,
    model: &EmotionNet<B>,
    metadata: &CheckpointMetadata,
) -> Result<()> {
    if let Some(parent) = stem.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), weights_file(stem))
        .map_err(|e| EmotionError::checkpoint(weights_file(stem), format!("{e:?}")))?;

    std::fs::write(metadata_file(stem), serde_json::to_string_pretty(metadata)?)?;
    Ok(())
}

pub fn load_metadata(stem: &Path) -> Result<CheckpointMetadata> {
    let path = metadata_file(stem);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| EmotionError::checkpoint(&path, e.to_string()))?;
    Ok(serde_json::from_str(&content)?)
}

/// Rebuild the network described by the metadata and load its weights.
pub fn load_checkpoint<B: Backend>(
    stem: &Path,
    device: &B::Device,
) -> Result<(EmotionNet<B>, CheckpointMetadata)> {
    let metadata = load_metadata(stem)?;
    let model = EmotionNet::<B>::new(device, &metadata.model)?;
    let model = load_weights(stem, model, device)?;
    Ok((model, metadata))
}

/// Overwrite `model`'s parameters with the weights saved under `stem`.
pub fn load_weights<B: Backend>(
    stem: &Path,
    model: EmotionNet<B>,
    device: &B::Device,
) -> Result<EmotionNet<B>> {
    let path = weights_file(stem);
    let record = BinFileRecorder::<FullPrecisionSettings>::new()
        .load(path.clone(), device)
        .map_err(|e| EmotionError::checkpoint(&path, format!("{e:?}")))?;
    Ok(model.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn tiny_config() -> ModelConfig {
        let mut config = ModelConfig::new(16, 2);
        config.blocks.truncate(2);
        config
    }

    fn metadata(epoch: usize, val_accuracy: f32) -> CheckpointMetadata {
        CheckpointMetadata {
            model: tiny_config(),
            classes: ClassMapping::fit(["Happy", "Sad"]),
            epoch,
            val_accuracy,
        }
    }

    #[test]
    fn test_only_strict_improvements_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = EmotionNet::<TestBackend>::new(&device, &tiny_config()).unwrap();
        let mut checkpoint = ModelCheckpoint::new(dir.path().join("best"));

        assert!(checkpoint.save_if_best(&model, &metadata(1, 0.4), 0.4).unwrap());
        assert!(!checkpoint.save_if_best(&model, &metadata(2, 0.4), 0.4).unwrap());
        assert!(!checkpoint.save_if_best(&model, &metadata(3, 0.3), 0.3).unwrap());
        assert!(!checkpoint.save_if_best(&model, &metadata(4, f32::NAN), f32::NAN).unwrap());
        assert!(checkpoint.save_if_best(&model, &metadata(5, 0.6), 0.6).unwrap());

        assert!(weights_file(checkpoint.path()).exists());
        assert_eq!(load_metadata(checkpoint.path()).unwrap().epoch, 5);
    }

    #[test]
    fn test_roundtrip_reproduces_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = EmotionNet::<TestBackend>::new(&device, &tiny_config()).unwrap();
        let stem = dir.path().join("weights");
        save_checkpoint(&stem, &model, &metadata(1, 0.5)).unwrap();

        let (restored, meta) = load_checkpoint::<TestBackend>(&stem, &device).unwrap();
        assert_eq!(meta.classes.decode(1), Some("Sad"));

        let x = Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);
        let before: Vec<f32> = model.forward(x.clone()).into_data().convert::<f32>().to_vec().unwrap();
        let after: Vec<f32> = restored.forward(x).into_data().convert::<f32>().to_vec().unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_missing_checkpoint_reports_path() {
        let err = load_checkpoint::<TestBackend>(Path::new("/nonexistent/best"), &Default::default())
            .unwrap_err();
        assert!(matches!(err, EmotionError::Checkpoint { .. }));
    }
}
