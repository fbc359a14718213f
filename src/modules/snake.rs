//! Snake activation used between every convolution of the DAC encoder.
//!
//! Both α and 1/α are kept as `[1, channels, 1]` tensors, broadcast over batch
//! and time.

use crate::weights::{require, StateDict};
use anyhow::Result;
use burn::tensor::{backend::Backend, Tensor, TensorData};

/// Periodic activation `x + sin²(αx) / (α + ε)` with one α per channel.
#[derive(Debug, Clone)]
pub struct Snake1d<B: Backend> {
    alpha: Tensor<B, 3>,
    inv_alpha: Tensor<B, 3>,
}

impl<B: Backend> Snake1d<B> {
    /// Build from per-channel α values.
    pub fn new(alpha: Vec<f32>, device: &B::Device) -> Self {
        let channels = alpha.len();
        let inv: Vec<f32> = alpha.iter().map(|a| 1.0 / (a + 1e-9)).collect();
        Self {
            alpha: Tensor::from_data(TensorData::new(alpha, [1, channels, 1]), device),
            inv_alpha: Tensor::from_data(TensorData::new(inv, [1, channels, 1]), device),
        }
    }

    /// Load `{prefix}.alpha`, stored as `[1, channels, 1]`.
    pub fn load(state: &StateDict, prefix: &str, device: &B::Device) -> Result<Self> {
        let alpha = require(state, &format!("{prefix}.alpha"))?.to_f32()?;
        Ok(Self::new(alpha, device))
    }

    /// Apply the activation to `[batch, channels, time]`.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let shape = input.dims();
        let alpha = self.alpha.clone().expand(shape);
        let inv_alpha = self.inv_alpha.clone().expand(shape);
        let wave = (alpha * input.clone()).sin();
        input + wave.clone() * wave * inv_alpha
    }
}
