//! Codec architecture configuration.
//!
//! Presets cover the published DAC checkpoints; a YAML file can describe any other
//! variant using the same fields. Load custom files with [`load_config`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Architecture and weight location of a DAC codec.
///
/// # Example YAML
///
/// ```yaml
/// model_type: 44khz
/// bitrate: 8kbps
/// sample_rate: 44100
/// encoder_dim: 64
/// encoder_rates: [2, 4, 8, 8]
/// decoder_dim: 1536
/// n_codebooks: 9
/// codebook_size: 1024
/// codebook_dim: 8
/// weights_path: "hf://descript/dac_44khz/model.safetensors"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodecConfig {
    /// Model family label, e.g. `44khz`.
    pub model_type: String,
    /// Nominal bitrate label, e.g. `8kbps`.
    pub bitrate: String,
    /// Sample rate the model expects, in Hz.
    pub sample_rate: u32,
    /// Channel width of the first encoder convolution.
    pub encoder_dim: usize,
    /// Downsampling stride of each encoder block.
    pub encoder_rates: Vec<usize>,
    /// Latent width; defaults to `encoder_dim * 2^len(encoder_rates)`.
    #[serde(default)]
    pub latent_dim: Option<usize>,
    /// Channel width of the first decoder convolution (geometry only).
    pub decoder_dim: usize,
    /// Upsampling strides of the decoder; defaults to the reversed encoder rates.
    #[serde(default)]
    pub decoder_rates: Option<Vec<usize>>,
    /// Number of residual codebooks in the checkpoint.
    pub n_codebooks: usize,
    /// Entries per codebook.
    pub codebook_size: usize,
    /// Dimension of each codebook entry.
    pub codebook_dim: usize,
    /// Local path, `https://` URL or `hf://` URL of the safetensors checkpoint.
    pub weights_path: String,
}

impl CodecConfig {
    /// Input samples consumed per output frame.
    pub fn hop_length(&self) -> usize {
        self.encoder_rates.iter().product()
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
            .unwrap_or(self.encoder_dim << self.encoder_rates.len())
    }

    pub fn decoder_rates(&self) -> Vec<usize> {
        self.decoder_rates
            .clone()
            .unwrap_or_else(|| self.encoder_rates.iter().rev().copied().collect())
    }

    /// Frames per second of encoded output.
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_length() as f64
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.encoder_rates.is_empty() || self.encoder_rates.contains(&0) {
            anyhow::bail!("encoder_rates must be non-empty and positive");
        }
        if self.n_codebooks == 0 || self.codebook_size == 0 || self.codebook_dim == 0 {
            anyhow::bail!("quantizer dimensions must be positive");
        }
        if self.codebook_size > u16::MAX as usize + 1 {
            anyhow::bail!(
                "codebook_size {} does not fit the 16-bit code format",
                self.codebook_size
            );
        }
        Ok(())
    }
}

/// A published checkpoint: model type, bitrate and architecture.
struct Preset {
    model_type: &'static str,
    bitrate: &'static str,
    sample_rate: u32,
    encoder_rates: &'static [usize],
    n_codebooks: usize,
    weights_path: &'static str,
}

const PRESETS: &[Preset] = &[
    Preset {
        model_type: "44khz",
        bitrate: "8kbps",
        sample_rate: 44100,
        encoder_rates: &[2, 4, 8, 8],
        n_codebooks: 9,
        weights_path: "hf://descript/dac_44khz/model.safetensors",
    },
    Preset {
        model_type: "24khz",
        bitrate: "8kbps",
        sample_rate: 24000,
        encoder_rates: &[2, 4, 5, 8],
        n_codebooks: 32,
        weights_path: "hf://descript/dac_24khz/model.safetensors",
    },
    Preset {
        model_type: "16khz",
        bitrate: "6kbps",
        sample_rate: 16000,
        encoder_rates: &[2, 4, 5, 8],
        n_codebooks: 12,
        weights_path: "hf://descript/dac_16khz/model.safetensors",
    },
];

/// Names of all built-in presets as `model_type/bitrate`.
pub fn available_presets() -> Vec<String> {
    PRESETS
        .iter()
        .map(|preset| format!("{}/{}", preset.model_type, preset.bitrate))
        .collect()
}

/// Look up a built-in preset by model type and bitrate.
pub fn preset(model_type: &str, bitrate: &str) -> anyhow::Result<CodecConfig> {
    let found = PRESETS
        .iter()
        .find(|p| p.model_type.eq_ignore_ascii_case(model_type) && p.bitrate.eq_ignore_ascii_case(bitrate))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown model {model_type}/{bitrate}; available: {}",
                available_presets().join(", ")
            )
        })?;
    Ok(CodecConfig {
        model_type: found.model_type.to_string(),
        bitrate: found.bitrate.to_string(),
        sample_rate: found.sample_rate,
        encoder_dim: 64,
        encoder_rates: found.encoder_rates.to_vec(),
        latent_dim: None,
        decoder_dim: 1536,
        decoder_rates: None,
        n_codebooks: found.n_codebooks,
        codebook_size: 1024,
        codebook_dim: 8,
        weights_path: found.weights_path.to_string(),
    })
}

/// Load a codec configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist, contains invalid YAML, or describes
/// an impossible architecture.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<CodecConfig> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let config: CodecConfig = serde_yaml::from_str(&data)?;
    config.validate()?;
    Ok(config)
}
