//! Residual vector quantizer with factorised, L2-normalised codebook lookup.

use crate::modules::conv::{ConvGeometry, WnConv1d};
use crate::weights::{require, StateDict};
use anyhow::Result;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

/// One codebook stage: project down, find the nearest entry, project back up.
#[derive(Debug, Clone)]
pub struct VectorQuantize<B: Backend> {
    in_proj: WnConv1d<B>,
    out_proj: WnConv1d<B>,
    /// Raw entries `[size, dim]`, used for the embedding.
    codebook: Tensor<B, 2>,
    /// Unit-norm entries `[size, dim]`, used for the nearest-neighbour search.
    normalized: Tensor<B, 2>,
}

impl<B: Backend> VectorQuantize<B> {
    pub fn load(state: &StateDict, prefix: &str, device: &B::Device) -> Result<Self> {
        let in_proj = WnConv1d::load(state, &format!("{prefix}.in_proj"), 1, 1, 0, device)?;
        let out_proj = WnConv1d::load(state, &format!("{prefix}.out_proj"), 1, 1, 0, device)?;

        let name = format!("{prefix}.codebook.weight");
        let raw = require(state, &name)?;
        let [size, dim]: [usize; 2] = raw
            .shape
            .clone()
            .try_into()
            .map_err(|_| anyhow::anyhow!("{name}: expected 2D codebook, got {:?}", raw.shape))?;
        if dim != in_proj.out_channels() {
            anyhow::bail!(
                "{name}: codebook dim {dim} does not match in_proj width {}",
                in_proj.out_channels()
            );
        }
        let codebook: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(raw.to_f32()?, [size, dim]), device);
        let normalized = l2_normalize(codebook.clone());
        Ok(Self {
            in_proj,
            out_proj,
            codebook,
            normalized,
        })
    }

    pub fn codebook_size(&self) -> usize {
        self.codebook.dims()[0]
    }

    /// Quantize `[batch, latent, frames]`, returning the reconstruction in latent
    /// space and the chosen indices `[batch, frames]`.
    pub fn forward(&self, latents: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 2, Int>) {
        let projected = self.in_proj.forward(latents, true);
        let [batch, dim, frames] = projected.dims();

        let flat = projected.swap_dims(1, 2).reshape([batch * frames, dim]);
        let indices = self.nearest(l2_normalize(flat));

        let embedded = self
            .codebook
            .clone()
            .select(0, indices.clone())
            .reshape([batch, frames, dim])
            .swap_dims(1, 2);
        let quantized = self.out_proj.forward(embedded, true);
        (quantized, indices.reshape([batch, frames]))
    }

    /// Index of the closest normalised codebook entry for each row of `encodings`.
    fn nearest(&self, encodings: Tensor<B, 2>) -> Tensor<B, 1, Int> {
        let rows = encodings.dims()[0];
        let size = self.normalized.dims()[0];

        let enc_sq = (encodings.clone() * encodings.clone())
            .sum_dim(1)
            .expand([rows, size]);
        let code_sq = (self.normalized.clone() * self.normalized.clone())
            .sum_dim(1)
            .reshape([1, size])
            .expand([rows, size]);
        let cross = encodings.matmul(self.normalized.clone().transpose());
        let dist = enc_sq - cross.mul_scalar(2.0) + code_sq;
        dist.argmin(1).reshape([rows])
    }
}

fn l2_normalize<B: Backend>(values: Tensor<B, 2>) -> Tensor<B, 2> {
    let shape = values.dims();
    let norm = (values.clone() * values.clone())
        .sum_dim(1)
        .sqrt()
        .clamp_min(1e-12)
        .expand(shape);
    values / norm
}

/// Stack of [`VectorQuantize`] stages, each coding the previous residual.
#[derive(Debug, Clone)]
pub struct ResidualVectorQuantize<B: Backend> {
    stages: Vec<VectorQuantize<B>>,
}

impl<B: Backend> ResidualVectorQuantize<B> {
    pub fn load(state: &StateDict, n_codebooks: usize, device: &B::Device) -> Result<Self> {
        let stages = (0..n_codebooks)
            .map(|idx| VectorQuantize::load(state, &format!("quantizer.quantizers.{idx}"), device))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn n_codebooks(&self) -> usize {
        self.stages.len()
    }

    pub fn codebook_size(&self) -> usize {
        self.stages.first().map_or(0, VectorQuantize::codebook_size)
    }

    /// Codes `[batch, n_quantizers, frames]` from latents `[batch, latent, frames]`.
    ///
    /// Only the first `n_quantizers` stages run; the caller validates the count.
    pub fn encode(&self, latents: Tensor<B, 3>, n_quantizers: usize) -> Tensor<B, 3, Int> {
        let [batch, _, frames] = latents.dims();
        let mut residual = latents;
        let mut codes = Vec::with_capacity(n_quantizers);
        for stage in self.stages.iter().take(n_quantizers) {
            let (quantized, indices) = stage.forward(residual.clone());
            residual = residual - quantized;
            codes.push(indices.reshape([batch, 1, frames]));
        }
        Tensor::cat(codes, 1)
    }
}

/// Conv geometry of the quantizer projections; all pointwise.
pub fn quantizer_geometry(n_codebooks: usize) -> Vec<ConvGeometry> {
    vec![ConvGeometry::conv(1, 1, 1); 2 * n_codebooks]
}
