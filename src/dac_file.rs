//! `.dac` container: residual-VQ codes plus the metadata needed to decode them.
//!
//! Codes are stored as a single `U16` tensor named `codes` with shape
//! `[channels, n_quantizers, frames]`; the remaining fields travel as string
//! metadata in the safetensors header.

use anyhow::{Context, Result};
use safetensors::tensor::TensorView;
use safetensors::{serialize, Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Format version written into every file.
pub const DAC_VERSION: &str = "1.0.0";

const CODES_TENSOR: &str = "codes";

/// Side information describing how the codes were produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DacMetadata {
    /// Integrated loudness of the input before normalisation, in LUFS.
    pub input_db: f64,
    /// Length of the input in samples at `sample_rate`.
    pub original_length: usize,
    /// Sample rate of the input file.
    pub sample_rate: u32,
    /// Frames produced per encoded window.
    pub chunk_length: usize,
    pub channels: usize,
    /// Whether the model ran padded (single pass) or windowed.
    pub padding: bool,
    pub dac_version: String,
}

impl DacMetadata {
    fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("input_db".to_string(), self.input_db.to_string()),
            ("original_length".to_string(), self.original_length.to_string()),
            ("sample_rate".to_string(), self.sample_rate.to_string()),
            ("chunk_length".to_string(), self.chunk_length.to_string()),
            ("channels".to_string(), self.channels.to_string()),
            ("padding".to_string(), self.padding.to_string()),
            ("dac_version".to_string(), self.dac_version.clone()),
        ])
    }

    fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        fn field<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            let raw = map
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("missing metadata field {key}"))?;
            raw.parse()
                .map_err(|e| anyhow::anyhow!("invalid metadata field {key}={raw}: {e}"))
        }

        Ok(Self {
            input_db: field(map, "input_db")?,
            original_length: field(map, "original_length")?,
            sample_rate: field(map, "sample_rate")?,
            chunk_length: field(map, "chunk_length")?,
            channels: field(map, "channels")?,
            padding: field(map, "padding")?,
            dac_version: field(map, "dac_version")?,
        })
    }
}

/// Encoded audio: codes in `[channels, n_quantizers, frames]` order plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DacFile {
    pub codes: Vec<u16>,
    pub shape: [usize; 3],
    pub metadata: DacMetadata,
}

impl DacFile {
    pub fn new(codes: Vec<u16>, shape: [usize; 3], metadata: DacMetadata) -> Result<Self> {
        if codes.len() != shape.iter().product::<usize>() {
            anyhow::bail!(
                "code buffer has {} values but shape {:?} needs {}",
                codes.len(),
                shape,
                shape.iter().product::<usize>()
            );
        }
        if shape[0] != metadata.channels {
            anyhow::bail!(
                "codes hold {} channels but metadata says {}",
                shape[0],
                metadata.channels
            );
        }
        Ok(Self {
            codes,
            shape,
            metadata,
        })
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn n_quantizers(&self) -> usize {
        self.shape[1]
    }

    pub fn frames(&self) -> usize {
        self.shape[2]
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes: Vec<u8> = self.codes.iter().flat_map(|c| c.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::U16, self.shape.to_vec(), &bytes)?;
        let encoded = serialize([(CODES_TENSOR, view)], &Some(self.metadata.to_map()))?;
        fs::write(path, encoded).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let (_, header) = SafeTensors::read_metadata(&bytes)
            .with_context(|| format!("{} is not a DAC file", path.display()))?;
        let metadata = header
            .metadata()
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("{} has no DAC metadata", path.display()))
            .and_then(DacMetadata::from_map)?;

        let tensors = SafeTensors::deserialize(&bytes)?;
        let view = tensors
            .tensor(CODES_TENSOR)
            .with_context(|| format!("{} has no codes tensor", path.display()))?;
        if view.dtype() != Dtype::U16 {
            anyhow::bail!("codes must be U16, found {:?}", view.dtype());
        }
        let shape: [usize; 3] = view
            .shape()
            .to_vec()
            .try_into()
            .map_err(|_| anyhow::anyhow!("codes must be 3D, found {:?}", view.shape()))?;
        let codes = view
            .data()
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Self::new(codes, shape, metadata)
    }
}
