//! SafeTensors weight loading and name mapping for DAC checkpoints.
//!
//! Two layouts exist in the wild: the `transformers` export
//! (`encoder.block.0.res_unit1.conv1.weight_g`) and the original descript layout
//! (`encoder.block.1.block.0.block.1.weight_g`). Everything is normalised onto the
//! `transformers` names, and weight-normalised convolutions are folded at load time.

use anyhow::Result;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Raw tensor payload extracted from a SafeTensors file.
#[derive(Debug, Clone)]
pub struct TensorData {
    /// Scalar dtype in the file.
    pub dtype: Dtype,
    /// Shape as a list of dimensions.
    pub shape: Vec<usize>,
    /// Raw byte buffer in row-major order.
    pub data: Vec<u8>,
}

impl TensorData {
    pub fn from_safetensor(tensor: safetensors::tensor::TensorView<'_>) -> Self {
        Self {
            dtype: tensor.dtype(),
            shape: tensor.shape().to_vec(),
            data: tensor.data().to_vec(),
        }
    }

    /// Build an `F32` payload; used by tests that synthesise checkpoints.
    pub fn from_f32(values: &[f32], shape: Vec<usize>) -> Self {
        Self {
            dtype: Dtype::F32,
            shape,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Decode the payload into `f32` values.
    pub fn to_f32(&self) -> Result<Vec<f32>> {
        let values = match self.dtype {
            Dtype::F32 => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Dtype::BF16 => self
                .data
                .chunks_exact(2)
                .map(|c| f32::from_bits((u16::from_le_bytes([c[0], c[1]]) as u32) << 16))
                .collect(),
            Dtype::F16 => self
                .data
                .chunks_exact(2)
                .map(|c| f16_to_f32(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            other => anyhow::bail!("Unsupported dtype {:?}", other),
        };
        Ok(values)
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

fn f16_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) as u32) << 31;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x3ff) as u32;
    let out = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, _) => {
            // Subnormal: renormalise into an f32 exponent.
            let mut e = 127 - 15 + 1;
            let mut m = mantissa;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | ((e as u32) << 23) | ((m & 0x3ff) << 13)
        }
        (0x1f, _) => sign | 0x7f80_0000 | (mantissa << 13),
        _ => sign | ((exponent + 127 - 15) << 23) | (mantissa << 13),
    };
    f32::from_bits(out)
}

/// Checkpoint tensors keyed by normalised module path.
pub type StateDict = HashMap<String, TensorData>;

/// Load the encoder and quantizer tensors of a DAC checkpoint.
///
/// `encoder_blocks` is the number of downsampling blocks, needed to place the
/// trailing snake/conv of the descript layout.
pub fn load_dac_state_dict(path: impl AsRef<Path>, encoder_blocks: usize) -> Result<StateDict> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)?;
    let mut state = HashMap::new();

    for name in tensors.names() {
        if let Some(mapped) = map_dac_name(name, encoder_blocks) {
            let tensor = tensors.tensor(name)?;
            state.insert(mapped, TensorData::from_safetensor(tensor));
        }
    }

    if state.is_empty() {
        anyhow::bail!("No encoder tensors found in {}", path.display());
    }
    Ok(state)
}

/// Map a checkpoint tensor name into the normalised layout, or `None` to skip it.
fn map_dac_name(name: &str, encoder_blocks: usize) -> Option<String> {
    const PARAMETRIZATION_SUFFIXES: &[(&str, &str)] = &[
        (".parametrizations.weight.original0", ".weight_g"),
        (".parametrizations.weight.original1", ".weight_v"),
    ];

    let name = name.strip_prefix("model.").unwrap_or(name);
    let mut name = name.to_string();
    for (from, to) in PARAMETRIZATION_SUFFIXES {
        if let Some(stem) = name.strip_suffix(from) {
            name = format!("{stem}{to}");
            break;
        }
    }

    if name.starts_with("quantizer.quantizers.") {
        return Some(name);
    }
    let rest = name.strip_prefix("encoder.")?;
    if is_transformers_encoder_name(rest) {
        return Some(name.clone());
    }
    map_descript_encoder_name(rest, encoder_blocks).map(|mapped| format!("encoder.{mapped}"))
}

fn is_transformers_encoder_name(rest: &str) -> bool {
    const TOP_LEVEL: &[&str] = &["conv1.", "conv2.", "snake1."];
    const IN_BLOCK: &[&str] = &["res_unit", "snake1.", "conv1."];

    if TOP_LEVEL.iter().any(|prefix| rest.starts_with(prefix)) {
        return true;
    }
    let Some(in_block) = rest.strip_prefix("block.") else {
        return false;
    };
    let Some((index, tail)) = in_block.split_once('.') else {
        return false;
    };
    index.parse::<usize>().is_ok() && IN_BLOCK.iter().any(|prefix| tail.starts_with(prefix))
}

/// Descript layout: `block.0` conv, `block.1..=n` encoder blocks, `block.n+1` snake,
/// `block.n+2` conv. Inside an encoder block, `block.0..=2` are residual units and
/// `block.3`/`block.4` the snake and strided conv.
fn map_descript_encoder_name(rest: &str, encoder_blocks: usize) -> Option<String> {
    let rest = rest.strip_prefix("block.")?;
    let (index, tail) = rest.split_once('.')?;
    let index: usize = index.parse().ok()?;

    if index == 0 {
        return Some(format!("conv1.{tail}"));
    }
    if index == encoder_blocks + 1 {
        return Some(format!("snake1.{tail}"));
    }
    if index == encoder_blocks + 2 {
        return Some(format!("conv2.{tail}"));
    }
    if index > encoder_blocks + 2 {
        return None;
    }

    let block = index - 1;
    let inner = tail.strip_prefix("block.")?;
    let (layer, layer_tail) = inner.split_once('.')?;
    match layer {
        "0" | "1" | "2" => {
            let unit = layer.parse::<usize>().ok()? + 1;
            let unit_rest = layer_tail.strip_prefix("block.")?;
            let (sub, sub_tail) = unit_rest.split_once('.')?;
            let sub_name = match sub {
                "0" => "snake1",
                "1" => "conv1",
                "2" => "snake2",
                "3" => "conv2",
                _ => return None,
            };
            Some(format!("block.{block}.res_unit{unit}.{sub_name}.{sub_tail}"))
        }
        "3" => Some(format!("block.{block}.snake1.{layer_tail}")),
        "4" => Some(format!("block.{block}.conv1.{layer_tail}")),
        _ => None,
    }
}

/// A convolution with its weight-norm folded into a plain `[out, in, kernel]` weight.
#[derive(Debug, Clone)]
pub struct ConvWeights {
    pub weight: Vec<f32>,
    pub shape: [usize; 3],
    pub bias: Option<Vec<f32>>,
}

/// Fetch a named tensor as `f32`, failing loudly when it is absent.
pub fn require<'a>(state: &'a StateDict, name: &str) -> Result<&'a TensorData> {
    state
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Missing tensor {name} in checkpoint"))
}

/// Resolve the convolution stored under `prefix`, folding weight normalisation.
pub fn conv_weights(state: &StateDict, prefix: &str) -> Result<ConvWeights> {
    let (weight, shape) = if let Some(v) = state.get(&format!("{prefix}.weight_v")) {
        let g = require(state, &format!("{prefix}.weight_g"))?;
        let shape = shape3(v, prefix)?;
        if g.numel() != shape[0] {
            anyhow::bail!(
                "{prefix}.weight_g has {} values for {} output channels",
                g.numel(),
                shape[0]
            );
        }
        (fold_weight_norm(&g.to_f32()?, &v.to_f32()?, shape[0]), shape)
    } else {
        let w = require(state, &format!("{prefix}.weight"))?;
        (w.to_f32()?, shape3(w, prefix)?)
    };
    let bias = match state.get(&format!("{prefix}.bias")) {
        Some(bias) => {
            if bias.numel() != shape[0] {
                anyhow::bail!("{prefix}.bias does not match {} output channels", shape[0]);
            }
            Some(bias.to_f32()?)
        }
        None => None,
    };
    Ok(ConvWeights {
        weight,
        shape,
        bias,
    })
}

fn shape3(tensor: &TensorData, prefix: &str) -> Result<[usize; 3]> {
    tensor
        .shape
        .clone()
        .try_into()
        .map_err(|_| anyhow::anyhow!("{prefix}: expected 3D weight, got {:?}", tensor.shape))
}

/// `w = g * v / ||v||`, with the norm taken over everything but the output channel.
pub fn fold_weight_norm(g: &[f32], v: &[f32], out_channels: usize) -> Vec<f32> {
    let per_channel = v.len() / out_channels.max(1);
    let mut folded = Vec::with_capacity(v.len());
    for (channel, chunk) in v.chunks(per_channel.max(1)).enumerate() {
        let norm = chunk.iter().map(|x| x * x).sum::<f32>().sqrt();
        let scale = if norm > 0.0 { g[channel] / norm } else { 0.0 };
        folded.extend(chunk.iter().map(|x| x * scale));
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::{
        conv_weights, f16_to_f32, fold_weight_norm, load_dac_state_dict, map_dac_name,
        StateDict, TensorData,
    };
    use safetensors::tensor::TensorView;
    use safetensors::{serialize, Dtype};
    use std::collections::HashMap;

    #[test]
    fn descript_names_map_onto_transformers_layout() {
        let cases = [
            ("encoder.block.0.weight_v", Some("encoder.conv1.weight_v")),
            (
                "encoder.block.1.block.0.block.0.alpha",
                Some("encoder.block.0.res_unit1.snake1.alpha"),
            ),
            (
                "encoder.block.2.block.2.block.3.bias",
                Some("encoder.block.1.res_unit3.conv2.bias"),
            ),
            ("encoder.block.4.block.3.alpha", Some("encoder.block.3.snake1.alpha")),
            ("encoder.block.4.block.4.weight_g", Some("encoder.block.3.conv1.weight_g")),
            ("encoder.block.5.alpha", Some("encoder.snake1.alpha")),
            ("encoder.block.6.bias", Some("encoder.conv2.bias")),
            ("decoder.model.0.weight_v", None),
        ];
        for (input, expected) in cases {
            assert_eq!(map_dac_name(input, 4).as_deref(), expected, "{input}");
        }
    }

    #[test]
    fn transformers_names_pass_through() {
        let cases = [
            "encoder.conv1.weight_g",
            "encoder.block.2.res_unit1.conv1.weight_v",
            "encoder.block.2.snake1.alpha",
            "encoder.block.2.conv1.bias",
            "encoder.snake1.alpha",
            "quantizer.quantizers.3.codebook.weight",
        ];
        for name in cases {
            assert_eq!(map_dac_name(name, 4).as_deref(), Some(name));
        }
        assert_eq!(
            map_dac_name("encoder.conv2.parametrizations.weight.original1", 4).as_deref(),
            Some("encoder.conv2.weight_v")
        );
        assert_eq!(map_dac_name("decoder.conv1.weight_g", 4), None);
    }

    #[test]
    fn weight_norm_folds_per_output_channel() {
        let v = [3.0_f32, 4.0, 0.0, 2.0];
        let folded = fold_weight_norm(&[10.0, 1.0], &v, 2);
        assert_eq!(folded, vec![6.0, 8.0, 0.0, 1.0]);
    }

    #[test]
    fn conv_weights_prefer_weight_norm_pair() {
        let mut state = StateDict::new();
        state.insert(
            "c.weight_v".to_string(),
            TensorData::from_f32(&[3.0, 4.0], vec![1, 1, 2]),
        );
        state.insert("c.weight_g".to_string(), TensorData::from_f32(&[5.0], vec![1, 1, 1]));
        state.insert("c.bias".to_string(), TensorData::from_f32(&[0.5], vec![1]));
        let conv = conv_weights(&state, "c").expect("conv");
        assert_eq!(conv.shape, [1, 1, 2]);
        assert_eq!(conv.weight, vec![3.0, 4.0]);
        assert_eq!(conv.bias, Some(vec![0.5]));

        let err = conv_weights(&state, "missing").unwrap_err();
        assert!(err.to_string().contains("Missing tensor missing.weight"));
    }

    #[test]
    fn decodes_half_precision() {
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x0000), 0.0);
        assert!((f16_to_f32(0x0001) - 5.960_464_5e-8).abs() < 1e-12);

        let bf16 = TensorData {
            dtype: Dtype::BF16,
            shape: vec![1],
            data: ((1.5_f32.to_bits() >> 16) as u16).to_le_bytes().to_vec(),
        };
        assert_eq!(bf16.to_f32().unwrap(), vec![1.5]);
    }

    #[test]
    fn loader_skips_decoder_tensors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dac.safetensors");
        let data: Vec<u8> = [1.0_f32].iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![1], &data).expect("view");
        let tensors: HashMap<String, TensorView<'_>> = [
            ("encoder.block.0.bias".to_string(), view.clone()),
            ("decoder.model.0.bias".to_string(), view.clone()),
            ("quantizer.quantizers.0.codebook.weight".to_string(), view),
        ]
        .into_iter()
        .collect();
        std::fs::write(&path, serialize(&tensors, &None).expect("serialize")).expect("write");

        let state = load_dac_state_dict(&path, 4).expect("load");
        assert!(state.contains_key("encoder.conv1.bias"));
        assert!(state.contains_key("quantizer.quantizers.0.codebook.weight"));
        assert_eq!(state.len(), 2);
    }
}
