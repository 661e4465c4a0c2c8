pub mod data;
pub mod dataset;
pub mod error;
pub mod model;
pub mod report;
pub mod training;

// Re-exports for convenience
pub use data::{AugmentedBatches, ClassificationBatch, DataAugmentation};
pub use dataset::{ClassMapping, DatasetSplit, EmotionDataset, Partition};
pub use error::{EmotionError, Result};
pub use model::{EmotionNet, ModelConfig, ModelSummary};
pub use report::{ConfusionMatrix, EvaluationReport, Evaluator};
pub use training::{ExperimentConfig, Trainer, TrainingHistory};
