//! Weight-normalised 1D convolution and the conv-stack geometry used to
//! compute codec delay and output lengths.

use crate::weights::{conv_weights, StateDict};
use anyhow::Result;
use burn::tensor::{
    backend::Backend,
    module::conv1d,
    ops::ConvOptions,
    Tensor, TensorData,
};

/// Kernel/stride/dilation of one convolution in the full codec stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub kernel_size: usize,
    pub stride: usize,
    pub dilation: usize,
    /// Transposed convolutions grow the signal instead of shrinking it.
    pub transpose: bool,
}

impl ConvGeometry {
    pub fn conv(kernel_size: usize, stride: usize, dilation: usize) -> Self {
        Self {
            kernel_size,
            stride,
            dilation,
            transpose: false,
        }
    }

    pub fn transpose(kernel_size: usize, stride: usize) -> Self {
        Self {
            kernel_size,
            stride,
            dilation: 1,
            transpose: true,
        }
    }

    fn span(&self) -> f64 {
        (self.dilation * (self.kernel_size - 1)) as f64
    }
}

/// Output length of an unpadded conv stack, flooring after every layer.
pub fn stack_output_length(layers: &[ConvGeometry], input_length: i64) -> i64 {
    let mut length = input_length as f64;
    for layer in layers {
        let stride = layer.stride as f64;
        length = if layer.transpose {
            (length - 1.0) * stride + layer.span() + 1.0
        } else {
            (length - layer.span() - 1.0) / stride + 1.0
        };
        length = length.floor();
    }
    length as i64
}

/// Samples of context an unpadded stack consumes on each side of its output.
pub fn stack_delay(layers: &[ConvGeometry]) -> i64 {
    let out_length = stack_output_length(layers, 0);
    let mut length = out_length as f64;
    for layer in layers.iter().rev() {
        let stride = layer.stride as f64;
        length = if layer.transpose {
            (length - layer.span() - 1.0) / stride + 1.0
        } else {
            (length - 1.0) * stride + layer.span() + 1.0
        };
        length = length.ceil();
    }
    (length as i64 - out_length).div_euclid(2)
}

/// 1D convolution with a folded weight-norm weight `[out, in, kernel]`.
#[derive(Debug, Clone)]
pub struct WnConv1d<B: Backend> {
    pub weight: Tensor<B, 3>,
    pub bias: Option<Tensor<B, 1>>,
    pub stride: usize,
    pub dilation: usize,
    /// Symmetric padding applied in padded mode.
    pub padding: usize,
}

impl<B: Backend> WnConv1d<B> {
    /// Load the convolution stored under `prefix`.
    pub fn load(
        state: &StateDict,
        prefix: &str,
        stride: usize,
        dilation: usize,
        padding: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let weights = conv_weights(state, prefix)?;
        let weight = Tensor::from_data(TensorData::new(weights.weight, weights.shape), device);
        let bias = weights.bias.map(|bias| {
            let len = bias.len();
            Tensor::from_data(TensorData::new(bias, [len]), device)
        });
        Ok(Self {
            weight,
            bias,
            stride,
            dilation,
            padding,
        })
    }

    pub fn out_channels(&self) -> usize {
        self.weight.dims()[0]
    }

    pub fn in_channels(&self) -> usize {
        self.weight.dims()[1]
    }

    pub fn geometry(&self) -> ConvGeometry {
        ConvGeometry::conv(self.weight.dims()[2], self.stride, self.dilation)
    }

    /// Convolve `[batch, in, time]`; `padded = false` drops the padding entirely.
    pub fn forward(&self, input: Tensor<B, 3>, padded: bool) -> Tensor<B, 3> {
        let padding = if padded { self.padding } else { 0 };
        conv1d(
            input,
            self.weight.clone(),
            self.bias.clone(),
            ConvOptions::new([self.stride], [padding], [self.dilation], 1),
        )
    }
}
