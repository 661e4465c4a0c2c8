use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EmotionError, Result};

/// Random perturbations applied to training images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Maximum rotation in degrees, sampled from `[-r, r]`.
    pub rotation_degrees: f32,
    /// Zoom factors are sampled from `[1 - z, 1 + z]` per axis.
    pub zoom_range: f32,
    /// Brightness multiplier range.
    pub brightness_range: (f32, f32),
    /// Shear factor sampled from `[-s, s]`.
    pub shear_range: f32,
    pub horizontal_flip: bool,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 15.0,
            zoom_range: 0.15,
            brightness_range: (0.6, 1.2),
            shear_range: 0.15,
            horizontal_flip: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    // Dataset
    pub data_dir: PathBuf,
    pub image_size: usize,
    /// Expected class count; checked against the folders found on disk.
    pub num_classes: Option<usize>,
    pub train_split: f64,
    /// Fraction of the held-out part that becomes the test partition.
    pub test_split_of_holdout: f64,
    pub seed: u64,

    // Training
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub dropout: f64,
    pub se_reduction: usize,
    pub augmentation: AugmentationConfig,

    // Early stopping
    pub early_stopping_patience: usize,

    // Learning-rate decay
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    pub lr_min_delta: f32,

    // Outputs
    pub output_dir: PathBuf,
    /// Checkpoint stem; weights go to `<stem>.bin`, metadata to `<stem>.json`.
    pub checkpoint_path: PathBuf,
    pub num_samples: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/emotions"),
            image_size: 48,
            num_classes: Some(6),
            train_split: 0.7,
            test_split_of_holdout: 0.5,
            seed: 3,
            epochs: 100,
            batch_size: 64,
            learning_rate: 1e-3,
            dropout: 0.5,
            se_reduction: 4,
            augmentation: AugmentationConfig::default(),
            early_stopping_patience: 15,
            lr_patience: 5,
            lr_factor: 0.5,
            min_lr: 1e-6,
            lr_min_delta: 1e-4,
            output_dir: PathBuf::from("runs/emotion"),
            checkpoint_path: PathBuf::from("runs/emotion/checkpoints/best_model"),
            num_samples: 5,
        }
    }
}

impl ExperimentConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ExperimentConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EmotionError::Configuration(msg));

        if !(self.train_split > 0.0 && self.train_split < 1.0) {
            return fail(format!("train_split must be in (0, 1), got {}", self.train_split));
        }
        if !(self.test_split_of_holdout > 0.0 && self.test_split_of_holdout < 1.0) {
            return fail(format!(
                "test_split_of_holdout must be in (0, 1), got {}",
                self.test_split_of_holdout
            ));
        }
        if self.image_size == 0 {
            return fail("image_size must be positive".to_string());
        }
        if self.batch_size == 0 {
            return fail("batch_size must be positive".to_string());
        }
        if self.epochs == 0 {
            return fail("epochs must be positive".to_string());
        }
        if self.learning_rate <= 0.0 {
            return fail(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            return fail(format!("lr_factor must be in (0, 1), got {}", self.lr_factor));
        }
        if self.min_lr < 0.0 {
            return fail(format!("min_lr must not be negative, got {}", self.min_lr));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if self.se_reduction == 0 {
            return fail("se_reduction must be at least 1".to_string());
        }
        if let Some(0) = self.num_classes {
            return fail("num_classes must be positive when set".to_string());
        }

        let (lo, hi) = self.augmentation.brightness_range;
        if lo <= 0.0 || lo > hi {
            return fail(format!("invalid brightness_range ({lo}, {hi})"));
        }
        if !(0.0..1.0).contains(&self.augmentation.zoom_range) {
            return fail(format!(
                "zoom_range must be in [0, 1), got {}",
                self.augmentation.zoom_range
            ));
        }

        Ok(())
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_experiment_constants() {
        let config = ExperimentConfig::default();
        assert_eq!(config.image_size, 48);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.epochs, 100);
        assert_eq!(config.early_stopping_patience, 15);
        assert_eq!(config.lr_patience, 5);
        assert_eq!(config.min_lr, 1e-6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.yaml");
        std::fs::write(&path, "epochs: 3\nbatch_size: 8\n").unwrap();

        let config = ExperimentConfig::from_yaml(&path).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.image_size, 48);

        let saved = dir.path().join("nested/saved.yaml");
        config.save(&saved).unwrap();
        let reloaded = ExperimentConfig::from_yaml(&saved).unwrap();
        assert_eq!(reloaded.epochs, 3);
        assert_eq!(reloaded.augmentation, AugmentationConfig::default());
    }

    #[test]
    fn test_invalid_split_rejected() {
        let config = ExperimentConfig {
            train_split: 1.0,
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EmotionError::Configuration(_))
        ));
    }
}
