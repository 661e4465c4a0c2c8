use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation;
use serde::{Deserialize, Serialize};

use super::blocks::conv::same_output_size;
use super::blocks::{BlockPlan, BlockSpec, Conv, FeatureShape, MbConvBlock};
use crate::error::{EmotionError, Result};
use crate::training::ExperimentConfig;

pub const STEM_FILTERS: usize = 32;

/// The seven inverted-residual stages: `(filters, kernel, stride, expansion)`.
pub const MB_BLOCKS: [BlockSpec; 7] = [
    BlockSpec::new(16, 3, 1, 1),
    BlockSpec::new(24, 3, 2, 6),
    BlockSpec::new(40, 5, 2, 6),
    BlockSpec::new(80, 3, 2, 6),
    BlockSpec::new(112, 5, 1, 6),
    BlockSpec::new(192, 5, 2, 6),
    BlockSpec::new(320, 3, 1, 6),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub image_size: usize,
    pub num_classes: usize,
    pub dropout: f64,
    pub se_reduction: usize,
    pub blocks: Vec<BlockSpec>,
}

impl ModelConfig {
    pub fn new(image_size: usize, num_classes: usize) -> Self {
        Self {
            image_size,
            num_classes,
            dropout: 0.5,
            se_reduction: 4,
            blocks: MB_BLOCKS.to_vec(),
        }
    }

    pub fn from_experiment(config: &ExperimentConfig, num_classes: usize) -> Self {
        Self {
            dropout: config.dropout,
            se_reduction: config.se_reduction,
            ..Self::new(config.image_size, num_classes)
        }
    }

    /// Shape plan of stem and blocks; fails on any topology that cannot be built.
    pub fn plan(&self) -> Result<NetworkPlan> {
        if self.num_classes == 0 {
            return Err(EmotionError::Configuration(
                "model needs at least one class".to_string(),
            ));
        }
        if self.image_size == 0 {
            return Err(EmotionError::Configuration(
                "image size must be positive".to_string(),
            ));
        }

        let stem_size = same_output_size(self.image_size, 2);
        let stem = FeatureShape {
            channels: STEM_FILTERS,
            height: stem_size,
            width: stem_size,
        };

        let mut blocks = Vec::with_capacity(self.blocks.len());
        let mut shape = stem;
        for spec in &self.blocks {
            let plan = BlockPlan::new(*spec, shape)?;
            shape = plan.output;
            blocks.push(plan);
        }

        Ok(NetworkPlan {
            input: FeatureShape {
                channels: 3,
                height: self.image_size,
                width: self.image_size,
            },
            stem,
            blocks,
            features: shape.channels,
            num_classes: self.num_classes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    pub input: FeatureShape,
    pub stem: FeatureShape,
    pub blocks: Vec<BlockPlan>,
    pub features: usize,
    pub num_classes: usize,
}

/// Stem -> MBConv stack -> global pool -> dropout -> dense classifier.
#[derive(Module, Debug)]
pub struct EmotionNet<B: Backend> {
    stem: Conv<B>,
    blocks: Vec<MbConvBlock<B>>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    classifier: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> EmotionNet<B> {
    pub fn new(device: &B::Device, config: &ModelConfig) -> Result<Self> {
        let plan = config.plan()?;

        let blocks = plan
            .blocks
            .iter()
            .map(|block| MbConvBlock::new(device, block, config.se_reduction))
            .collect();

        let model = Self {
            stem: Conv::new(device, 3, STEM_FILTERS, 3, 2),
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            classifier: LinearConfig::new(plan.features, config.num_classes).init(device),
            num_classes: config.num_classes,
        };

        log::debug!(
            "EmotionNet built: {} blocks, {} parameters",
            model.blocks.len(),
            model.num_params()
        );
        Ok(model)
    }

    /// Class logits, shape `[batch, num_classes]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.features(x);
        let features = self.dropout.forward(features);
        self.classifier.forward(features)
    }

    /// Softmax probabilities over classes.
    pub fn predict_proba(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        activation::softmax(self.forward(x), 1)
    }

    /// Globally pooled features before the classifier, `[batch, channels]`.
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let [batch, channels, _, _] = x.dims();
        self.pool.forward(x).reshape([batch, channels])
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn blocks(&self) -> &[MbConvBlock<B>] {
        &self.blocks
    }

    pub(crate) fn stem(&self) -> &Conv<B> {
        &self.stem
    }

    pub(crate) fn classifier(&self) -> &Linear<B> {
        &self.classifier
    }
}
