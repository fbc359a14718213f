//! DAC encoder model and the `compress` pipeline that turns a waveform into a
//! [`DacFile`].
//!
//! Short inputs are encoded in one padded pass. Longer inputs run the model
//! unpadded over overlapping windows: the signal is padded by the codec delay
//! on both ends and each window advances by exactly the number of samples its
//! codes can reconstruct, so window outputs tile without seams.

use crate::{
    audio::{loudness, resample::AudioResampler},
    config::CodecConfig,
    dac_file::{DacFile, DacMetadata, DAC_VERSION},
    download::download_if_necessary,
    modules::{
        conv::{stack_delay, stack_output_length, ConvGeometry},
        encoder::{decoder_geometry, encoder_geometry, Encoder},
        quantizer::{quantizer_geometry, ResidualVectorQuantize},
    },
    perf::{self, Metric},
    weights::{load_dac_state_dict, StateDict},
};
use anyhow::Result;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

/// Loudness every input is normalised to before encoding, in LUFS.
pub const DEFAULT_NORMALIZE_DB: f64 = -16.0;

/// Knobs for [`DacEncoder::compress`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompressOptions {
    /// Residual codebooks to keep.
    pub n_quantizers: usize,
    /// Window length in seconds; `None` always encodes in a single pass.
    pub win_duration: Option<f64>,
    /// Windows pushed through the model per forward call.
    pub batch_size: usize,
    /// Target loudness, or `None` to leave the gain untouched.
    pub normalize_db: Option<f64>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            n_quantizers: 4,
            win_duration: Some(5.0),
            batch_size: 1,
            normalize_db: Some(DEFAULT_NORMALIZE_DB),
        }
    }
}

/// Encoder half of a DAC codec with its residual quantizer.
#[derive(Debug)]
pub struct DacEncoder<B: Backend> {
    pub config: CodecConfig,
    encoder: Encoder<B>,
    quantizer: ResidualVectorQuantize<B>,
    geometry: Vec<ConvGeometry>,
    device: B::Device,
}

impl<B: Backend> DacEncoder<B> {
    /// Resolve the configured weights (downloading if needed) and build the model.
    pub fn from_config(config: &CodecConfig, device: &B::Device) -> Result<Self> {
        let _span = perf::span(Metric::ModelLoad);
        let path = download_if_necessary(&config.weights_path)?;
        log::info!("Loading {} codec weights from {}", config.model_type, path.display());
        let state = load_dac_state_dict(&path, config.encoder_rates.len())?;
        Self::from_state_dict(config.clone(), &state, device)
    }

    pub fn from_state_dict(
        config: CodecConfig,
        state: &StateDict,
        device: &B::Device,
    ) -> Result<Self> {
        let encoder = Encoder::load(state, &config.encoder_rates, device)?;
        if encoder.latent_dim() != config.latent_dim() {
            anyhow::bail!(
                "checkpoint latent width {} does not match configured {}",
                encoder.latent_dim(),
                config.latent_dim()
            );
        }
        let quantizer = ResidualVectorQuantize::load(state, config.n_codebooks, device)?;
        if quantizer.codebook_size() != config.codebook_size {
            anyhow::bail!(
                "checkpoint codebooks hold {} entries, configured {}",
                quantizer.codebook_size(),
                config.codebook_size
            );
        }
        Ok(Self {
            geometry: codec_geometry(&config),
            config,
            encoder,
            quantizer,
            device: device.clone(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn hop_length(&self) -> usize {
        self.config.hop_length()
    }

    /// Context samples padded onto each side of the signal in windowed mode.
    pub fn delay(&self) -> usize {
        stack_delay(&self.geometry).max(0) as usize
    }

    /// Samples the full codec reconstructs from an unpadded window of `length`.
    pub fn output_length(&self, length: usize) -> i64 {
        stack_output_length(&self.geometry, length as i64)
    }

    /// Run encoder and quantizer on `[batch, 1, samples]`.
    pub fn encode(&self, audio: Tensor<B, 3>, padded: bool, n_quantizers: usize) -> Tensor<B, 3, Int> {
        let latents = {
            let _span = perf::span(Metric::EncoderForward);
            self.encoder.forward(audio, padded)
        };
        let _span = perf::span(Metric::QuantizerForward);
        self.quantizer.encode(latents, n_quantizers)
    }

    /// Encode planar audio at `sample_rate` into a [`DacFile`].
    pub fn compress(
        &self,
        samples: Vec<Vec<f32>>,
        sample_rate: u32,
        options: &CompressOptions,
    ) -> Result<DacFile> {
        let n_quantizers = options.n_quantizers;
        if n_quantizers == 0 || n_quantizers > self.quantizer.n_codebooks() {
            anyhow::bail!(
                "n_quantizers must be between 1 and {}, got {n_quantizers}",
                self.quantizer.n_codebooks()
            );
        }
        if options.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        let channels = samples.len();
        let original_length = samples.first().map_or(0, Vec::len);
        if channels == 0 || original_length == 0 {
            anyhow::bail!("cannot encode empty audio");
        }

        let model_rate = self.sample_rate();
        let mut audio = AudioResampler::resample(samples, sample_rate, model_rate)?;
        let input_db = {
            let _span = perf::span(Metric::AudioLoudness);
            let input_db = loudness::integrated_loudness(&audio, model_rate)?;
            if let Some(target) = options.normalize_db {
                loudness::normalize(&mut audio, input_db, target);
            }
            loudness::ensure_max_peak(&mut audio, 1.0);
            input_db
        };

        let plan = self.plan_windows(audio[0].len(), options.win_duration)?;
        log::debug!(
            "Encoding {} window(s) of {} samples (padded: {})",
            plan.starts.len(),
            plan.window,
            plan.padded
        );
        if !plan.padded {
            let delay = self.delay();
            for channel in &mut audio {
                let mut padded = vec![0.0; delay];
                padded.extend_from_slice(channel);
                padded.resize(padded.len() + delay, 0.0);
                *channel = padded;
            }
        }

        let mut window_codes = Vec::with_capacity(plan.starts.len());
        let mut chunk_length = 0;
        for starts in plan.starts.chunks(options.batch_size) {
            let rows = starts.len() * channels;
            let mut batch = Vec::with_capacity(rows * plan.window);
            for &start in starts {
                for channel in &audio {
                    let end = (start + plan.window).min(channel.len());
                    let slice = channel.get(start..end).unwrap_or(&[]);
                    batch.extend_from_slice(slice);
                    batch.resize(batch.len() + plan.window - slice.len(), 0.0);
                }
            }
            let input: Tensor<B, 3> =
                Tensor::from_data(TensorData::new(batch, [rows, 1, plan.window]), &self.device);
            let codes = self.encode(input, plan.padded, n_quantizers);
            let [_, _, frames] = codes.dims();
            if frames == 0 {
                anyhow::bail!("window of {} samples produced no frames", plan.window);
            }
            chunk_length = frames;

            let values = codes
                .into_data()
                .convert::<i64>()
                .into_vec::<i64>()
                .map_err(|e| anyhow::anyhow!("failed to read codes: {e:?}"))?;
            // Row-major [rows, n_q, frames]; one entry per window.
            for window in values.chunks(channels * n_quantizers * frames) {
                window_codes.push(window.to_vec());
            }
        }

        let frames = chunk_length;
        let total_frames = frames * window_codes.len();
        let mut codes = vec![0u16; channels * n_quantizers * total_frames];
        for (window_idx, window) in window_codes.iter().enumerate() {
            for (row, row_codes) in window.chunks(frames).enumerate() {
                let channel = row / n_quantizers;
                let quantizer = row % n_quantizers;
                let offset = (channel * n_quantizers + quantizer) * total_frames + window_idx * frames;
                for (slot, &code) in codes[offset..offset + frames].iter_mut().zip(row_codes) {
                    *slot = u16::try_from(code)
                        .map_err(|_| anyhow::anyhow!("code {code} does not fit in 16 bits"))?;
                }
            }
        }

        perf::add_count(Metric::FramesEncoded, total_frames as u64);
        perf::add_count(Metric::SamplesEncoded, original_length as u64);

        let metadata = DacMetadata {
            input_db,
            original_length,
            sample_rate,
            chunk_length,
            channels,
            padding: plan.padded,
            dac_version: DAC_VERSION.to_string(),
        };
        DacFile::new(codes, [channels, n_quantizers, total_frames], metadata)
    }

    /// Decide between one padded pass and unpadded windows over `length` samples.
    fn plan_windows(&self, length: usize, win_duration: Option<f64>) -> Result<WindowPlan> {
        let rate = self.sample_rate() as f64;
        let hop = self.hop_length();
        let duration = length as f64 / rate;

        match win_duration {
            Some(win) if duration > win => {
                let window = ((win * rate) as usize).div_ceil(hop) * hop;
                let step = self.output_length(window);
                if step <= 0 {
                    anyhow::bail!(
                        "win_duration {win}s is shorter than the codec receptive field"
                    );
                }
                Ok(WindowPlan {
                    padded: false,
                    window,
                    starts: (0..length).step_by(step as usize).collect(),
                })
            }
            _ => Ok(WindowPlan {
                padded: true,
                window: length.div_ceil(hop) * hop,
                starts: vec![0],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct WindowPlan {
    padded: bool,
    /// Samples fed to the model per window.
    window: usize,
    /// Start offset of every window in the (delay-padded) signal.
    starts: Vec<usize>,
}

/// Every convolution of the full codec, in order, for delay bookkeeping.
pub fn codec_geometry(config: &CodecConfig) -> Vec<ConvGeometry> {
    let mut layers = encoder_geometry(&config.encoder_rates);
    layers.extend(quantizer_geometry(config.n_codebooks));
    layers.extend(decoder_geometry(&config.decoder_rates()));
    layers
}

#[cfg(test)]
mod tests {
    use super::{codec_geometry, CompressOptions, DacEncoder};
    use crate::config::preset;
    use crate::modules::conv::{stack_delay, stack_output_length};
    use crate::modules::test_support::{tiny_config, tiny_state_dict};
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn tiny_encoder() -> DacEncoder<TestBackend> {
        DacEncoder::from_state_dict(tiny_config(), &tiny_state_dict(), &NdArrayDevice::default())
            .expect("model")
    }

    fn tone(len: usize, phase: f32) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05 + phase).sin() * 0.3).collect()
    }

    #[test]
    fn geometry_of_44khz_model() {
        let config = preset("44khz", "8kbps").expect("preset");
        let layers = codec_geometry(&config);
        assert_eq!(stack_delay(&layers), 7904);
        assert_eq!(stack_output_length(&layers, 220_672), 204_650);
    }

    #[test]
    fn short_input_is_encoded_in_one_padded_pass() {
        let model = tiny_encoder();
        let samples = vec![tone(78, 0.0), tone(78, 1.0)];
        let file = model
            .compress(samples, 8000, &CompressOptions::default())
            .expect("compress");
        assert_eq!(file.shape, [2, 2, 20]);
        assert!(file.metadata.padding);
        assert_eq!(file.metadata.chunk_length, 20);
        assert_eq!(file.metadata.original_length, 78);
        assert_eq!(file.metadata.sample_rate, 8000);
        assert!(file.codes.iter().all(|&code| code < 4));
        assert!(file.metadata.input_db >= -70.0);
    }

    #[test]
    fn long_input_is_windowed_and_batched() {
        let model = tiny_encoder();
        let length = 4000;
        let options = CompressOptions {
            n_quantizers: 1,
            win_duration: Some(0.1),
            batch_size: 3,
            normalize_db: None,
        };
        let file = model
            .compress(vec![tone(length, 0.0)], 8000, &options)
            .expect("compress");
        assert!(!file.metadata.padding);

        let step = model.output_length(800) as usize;
        let windows = length.div_ceil(step);
        assert_eq!(file.shape[1], 1);
        assert_eq!(file.frames(), windows * file.metadata.chunk_length);

        // Batching only changes how windows are grouped, never the codes.
        let single = model
            .compress(
                vec![tone(length, 0.0)],
                8000,
                &CompressOptions {
                    batch_size: 1,
                    ..options
                },
            )
            .expect("compress");
        assert_eq!(single.codes, file.codes);
    }

    #[test]
    fn rejects_invalid_quantizer_count() {
        let model = tiny_encoder();
        let options = CompressOptions {
            n_quantizers: 3,
            ..CompressOptions::default()
        };
        let err = model.compress(vec![tone(64, 0.0)], 8000, &options).unwrap_err();
        assert!(err.to_string().contains("between 1 and 2"));
        assert!(model
            .compress(vec![Vec::new()], 8000, &CompressOptions::default())
            .is_err());
    }
}
