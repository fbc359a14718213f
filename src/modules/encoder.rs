//! Convolutional DAC encoder: strided blocks of dilated residual units with
//! snake activations, mapping a mono waveform to latent frames.

use crate::modules::conv::{ConvGeometry, WnConv1d};
use crate::modules::snake::Snake1d;
use crate::weights::StateDict;
use anyhow::Result;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

const RESIDUAL_DILATIONS: [usize; 3] = [1, 3, 9];
const RESIDUAL_KERNEL: usize = 7;

/// Dilated residual unit: snake, k7 dilated conv, snake, pointwise conv, plus skip.
#[derive(Debug, Clone)]
pub struct ResidualUnit<B: Backend> {
    snake1: Snake1d<B>,
    conv1: WnConv1d<B>,
    snake2: Snake1d<B>,
    conv2: WnConv1d<B>,
}

impl<B: Backend> ResidualUnit<B> {
    /// Load `{prefix}.snake1/conv1/snake2/conv2`; `dilation` sets the k7 conv's spacing.
    pub fn load(
        state: &StateDict,
        prefix: &str,
        dilation: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let padding = (RESIDUAL_KERNEL - 1) * dilation / 2;
        Ok(Self {
            snake1: Snake1d::load(state, &format!("{prefix}.snake1"), device)?,
            conv1: WnConv1d::load(state, &format!("{prefix}.conv1"), 1, dilation, padding, device)?,
            snake2: Snake1d::load(state, &format!("{prefix}.snake2"), device)?,
            conv2: WnConv1d::load(state, &format!("{prefix}.conv2"), 1, 1, 0, device)?,
        })
    }

    /// Apply the unit to `[batch, channels, time]`.
    ///
    /// Unpadded, the output is shorter than the input by the dilated kernel's reach.
    pub fn forward(&self, input: Tensor<B, 3>, padded: bool) -> Tensor<B, 3> {
        let mut value = self.snake1.forward(input.clone());
        value = self.conv1.forward(value, padded);
        value = self.snake2.forward(value);
        value = self.conv2.forward(value, padded);

        // Unpadded convs shorten the signal; centre-crop the skip path to match.
        let input_len = input.dims()[2];
        let output_len = value.dims()[2];
        let trim = input_len.saturating_sub(output_len) / 2;
        let skip = if trim > 0 {
            input.narrow(2, trim, output_len)
        } else {
            input
        };
        skip + value
    }
}

/// Three residual units (dilations 1, 3, 9) followed by a strided conv that
/// doubles the channels and divides time by the stride.
#[derive(Debug, Clone)]
pub struct EncoderBlock<B: Backend> {
    units: Vec<ResidualUnit<B>>,
    snake: Snake1d<B>,
    conv: WnConv1d<B>,
}

impl<B: Backend> EncoderBlock<B> {
    /// Load `{prefix}.res_unit{1,2,3}`, `{prefix}.snake1` and the `2·stride` kernel `{prefix}.conv1`.
    pub fn load(
        state: &StateDict,
        prefix: &str,
        stride: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let units = RESIDUAL_DILATIONS
            .iter()
            .enumerate()
            .map(|(idx, &dilation)| {
                ResidualUnit::load(state, &format!("{prefix}.res_unit{}", idx + 1), dilation, device)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            units,
            snake: Snake1d::load(state, &format!("{prefix}.snake1"), device)?,
            conv: WnConv1d::load(
                state,
                &format!("{prefix}.conv1"),
                stride,
                1,
                stride.div_ceil(2),
                device,
            )?,
        })
    }

    pub fn forward(&self, mut input: Tensor<B, 3>, padded: bool) -> Tensor<B, 3> {
        for unit in &self.units {
            input = unit.forward(input, padded);
        }
        input = self.snake.forward(input);
        self.conv.forward(input, padded)
    }
}

/// Full encoder: stem conv, downsampling blocks, snake and latent projection.
#[derive(Debug, Clone)]
pub struct Encoder<B: Backend> {
    stem: WnConv1d<B>,
    blocks: Vec<EncoderBlock<B>>,
    snake: Snake1d<B>,
    head: WnConv1d<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn load(
        state: &StateDict,
        rates: &[usize],
        device: &B::Device,
    ) -> Result<Self> {
        let stem = WnConv1d::load(state, "encoder.conv1", 1, 1, 3, device)?;
        if stem.in_channels() != 1 {
            anyhow::bail!(
                "encoder.conv1 expects {} input channels; only mono rows are supported",
                stem.in_channels()
            );
        }
        let blocks = rates
            .iter()
            .enumerate()
            .map(|(idx, &stride)| {
                EncoderBlock::load(state, &format!("encoder.block.{idx}"), stride, device)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stem,
            blocks,
            snake: Snake1d::load(state, "encoder.snake1", device)?,
            head: WnConv1d::load(state, "encoder.conv2", 1, 1, 1, device)?,
        })
    }

    /// Width of the latent frames produced by [`Encoder::forward`].
    pub fn latent_dim(&self) -> usize {
        self.head.out_channels()
    }

    /// Encode `[batch, 1, samples]` into `[batch, latent, frames]`.
    pub fn forward(&self, input: Tensor<B, 3>, padded: bool) -> Tensor<B, 3> {
        let mut value = self.stem.forward(input, padded);
        for block in &self.blocks {
            value = block.forward(value, padded);
        }
        value = self.snake.forward(value);
        self.head.forward(value, padded)
    }
}

/// Conv geometry of the encoder in module order.
pub fn encoder_geometry(rates: &[usize]) -> Vec<ConvGeometry> {
    let mut layers = vec![ConvGeometry::conv(7, 1, 1)];
    for &stride in rates {
        layers.extend(residual_geometry());
        layers.push(ConvGeometry::conv(2 * stride, stride, 1));
    }
    layers.push(ConvGeometry::conv(3, 1, 1));
    layers
}

/// Conv geometry of the matching decoder, used only for delay bookkeeping.
pub fn decoder_geometry(rates: &[usize]) -> Vec<ConvGeometry> {
    let mut layers = vec![ConvGeometry::conv(7, 1, 1)];
    for &stride in rates {
        layers.push(ConvGeometry::transpose(2 * stride, stride));
        layers.extend(residual_geometry());
    }
    layers.push(ConvGeometry::conv(7, 1, 1));
    layers
}

fn residual_geometry() -> impl Iterator<Item = ConvGeometry> {
    RESIDUAL_DILATIONS.into_iter().flat_map(|dilation| {
        [
            ConvGeometry::conv(RESIDUAL_KERNEL, 1, dilation),
            ConvGeometry::conv(1, 1, 1),
        ]
    })
}
