use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::conv::same_output_size;
use super::{Conv, SqueezeExcitation};
use crate::error::{EmotionError, Result};

/// `(filters, kernel, stride, expansion)` of one inverted-residual block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub filters: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub expansion: usize,
}

impl BlockSpec {
    pub const fn new(filters: usize, kernel_size: usize, stride: usize, expansion: usize) -> Self {
        Self {
            filters,
            kernel_size,
            stride,
            expansion,
        }
    }
}

/// Feature-map shape `(channels, height, width)` flowing between blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

/// Shapes a block will see, worked out before any weights exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    pub spec: BlockSpec,
    pub input: FeatureShape,
    pub expanded: FeatureShape,
    pub output: FeatureShape,
    pub residual: bool,
}

impl BlockPlan {
    /// The residual add is requested when stride is 1 and channels match;
    /// it is then only legal if the full input and output shapes agree.
    pub fn new(spec: BlockSpec, input: FeatureShape) -> Result<Self> {
        if spec.filters == 0 || spec.kernel_size == 0 || spec.stride == 0 || spec.expansion == 0 {
            return Err(EmotionError::Configuration(format!(
                "invalid block specification {spec:?}"
            )));
        }

        let height = same_output_size(input.height, spec.stride);
        let width = same_output_size(input.width, spec.stride);
        let expanded = FeatureShape {
            channels: input.channels * spec.expansion,
            height,
            width,
        };
        let output = FeatureShape {
            channels: spec.filters,
            height,
            width,
        };

        let residual = spec.stride == 1 && input.channels == spec.filters;
        if residual && input != output {
            return Err(EmotionError::Configuration(format!(
                "residual add between mismatched shapes {input:?} and {output:?}"
            )));
        }

        Ok(Self {
            spec,
            input,
            expanded,
            output,
            residual,
        })
    }
}

/// Inverted residual block with squeeze-and-excitation.
///
/// expand (1x1) -> depthwise (kxk, stride) -> project (1x1) -> SE gate,
/// plus the block input when the plan allows a residual.
#[derive(Module, Debug)]
pub struct MbConvBlock<B: Backend> {
    expand: Conv<B>,
    depthwise: Conv<B>,
    project: Conv<B>,
    se: SqueezeExcitation<B>,
    residual: bool,
}

impl<B: Backend> MbConvBlock<B> {
    pub fn new(device: &B::Device, plan: &BlockPlan, se_reduction: usize) -> Self {
        let spec = plan.spec;
        let in_channels = plan.input.channels;
        let hidden = plan.expanded.channels;

        Self {
            expand: Conv::new(device, in_channels, hidden, 1, 1),
            depthwise: Conv::depthwise(device, hidden, spec.kernel_size, spec.stride),
            project: Conv::linear(device, hidden, spec.filters),
            se: SqueezeExcitation::new(device, spec.filters, se_reduction),
            residual: plan.residual,
        }
    }

    pub fn uses_residual(&self) -> bool {
        self.residual
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.expand.forward(input.clone());
        let x = self.depthwise.forward(x);
        let x = self.project.forward(x);
        let x = self.se.forward(x);

        if self.residual {
            debug_assert_eq!(x.dims(), input.dims());
            x + input
        } else {
            x
        }
    }
}
