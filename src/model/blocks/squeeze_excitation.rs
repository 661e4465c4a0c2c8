use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation;

/// Channel attention: pool -> reduce (ReLU) -> expand (sigmoid) -> rescale.
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pool: AdaptiveAvgPool2d,
    reduce: Linear<B>,
    expand: Linear<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    pub fn new(device: &B::Device, channels: usize, reduction: usize) -> Self {
        let reduced = (channels / reduction).max(1);

        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: LinearConfig::new(channels, reduced).init(device),
            expand: LinearConfig::new(reduced, channels).init(device),
        }
    }

    /// Per-example channel gates in `[0, 1]`, shape `[batch, channels]`.
    pub fn gates(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, channels, _, _] = x.dims();
        let squeezed = self.pool.forward(x).reshape([batch, channels]);
        let hidden = activation::relu(self.reduce.forward(squeezed));
        activation::sigmoid(self.expand.forward(hidden))
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, _, _] = x.dims();
        let gates = self.gates(x.clone()).reshape([batch, channels, 1, 1]);
        x * gates
    }
}
