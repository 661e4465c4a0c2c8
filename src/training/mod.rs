pub mod checkpoint;
pub mod config;
pub mod early_stopping;
pub mod history;
pub mod metrics;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{load_checkpoint, CheckpointMetadata, ModelCheckpoint};
pub use config::{AugmentationConfig, ExperimentConfig};
pub use early_stopping::{BestWeights, EarlyStopping};
pub use history::{EpochRecord, TrainingHistory};
pub use metrics::{evaluate_partition, predict_probabilities, PartitionMetrics};
pub use scheduler::ReduceLrOnPlateau;
pub use trainer::Trainer;
