use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Metrics of one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
    /// Learning rate the epoch was trained with.
    pub learning_rate: f64,
}

impl EpochRecord {
    pub fn is_finite(&self) -> bool {
        [
            self.train_loss,
            self.train_accuracy,
            self.val_loss,
            self.val_accuracy,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Ordered per-epoch records. Only ever appended to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
    /// Epoch whose weights the trainer returned, if any epoch improved.
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn best(&self) -> Option<&EpochRecord> {
        self.records
            .iter()
            .filter(|r| r.val_accuracy.is_finite())
            .max_by(|a, b| a.val_accuracy.total_cmp(&b.val_accuracy))
    }

    pub fn train_accuracy(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.train_accuracy).collect()
    }

    pub fn val_accuracy(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.val_accuracy).collect()
    }

    pub fn train_loss(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.train_loss).collect()
    }

    pub fn val_loss(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.val_loss).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
