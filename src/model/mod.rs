pub mod blocks;
pub mod emotion_net;
pub mod summary;

pub use blocks::{BlockPlan, BlockSpec, FeatureShape, MbConvBlock, SqueezeExcitation};
pub use emotion_net::{EmotionNet, ModelConfig, NetworkPlan, MB_BLOCKS};
pub use summary::ModelSummary;
