use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// Convolution -> batch norm -> optional Swish.
///
/// Padding is `kernel / 2` on both axes, which gives "same" output sizes
/// (`ceil(input / stride)`) for the odd kernels used here.
#[derive(Module, Debug)]
pub struct Conv<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
    activate: bool,
}

impl<B: Backend> Conv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        Self::build(device, in_channels, out_channels, kernel_size, stride, 1, true)
    }

    /// Per-channel spatial convolution (`groups == channels`).
    pub fn depthwise(device: &B::Device, channels: usize, kernel_size: usize, stride: usize) -> Self {
        Self::build(device, channels, channels, kernel_size, stride, channels, true)
    }

    /// 1x1 projection without activation.
    pub fn linear(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self::build(device, in_channels, out_channels, 1, 1, 1, false)
    }

    fn build(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        activate: bool,
    ) -> Self {
        let padding = kernel_size / 2;

        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(groups)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels)
                .with_momentum(0.01)
                .with_epsilon(1e-3)
                .init(device),
            activate,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        if self.activate {
            activation::silu(x)
        } else {
            x
        }
    }
}

/// Output size of a "same"-padded convolution.
pub fn same_output_size(input: usize, stride: usize) -> usize {
    input.div_ceil(stride)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_strided_conv_halves_spatial_size() {
        let device = Default::default();
        let conv = Conv::<TestBackend>::new(&device, 3, 32, 3, 2);
        let x = Tensor::<TestBackend, 4>::zeros([2, 3, 48, 48], &device);
        assert_eq!(conv.forward(x).dims(), [2, 32, 24, 24]);
    }

    #[test]
    fn test_depthwise_keeps_channels() {
        let device = Default::default();
        let conv = Conv::<TestBackend>::depthwise(&device, 8, 5, 2);
        let x = Tensor::<TestBackend, 4>::zeros([1, 8, 3, 3], &device);
        assert_eq!(conv.forward(x).dims(), [1, 8, 2, 2]);
        assert_eq!(same_output_size(3, 2), 2);
    }
}
