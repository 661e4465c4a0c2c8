pub mod dataloader;
pub mod transforms;

pub use dataloader::{steps_per_epoch, AugmentedBatches, ClassificationBatch};
pub use transforms::{apply_params, AugmentParams, DataAugmentation};
