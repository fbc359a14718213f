use anyhow::Result;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::perf::{self, Metric};

#[derive(Debug, Default)]
pub struct AudioResampler;

impl AudioResampler {
    /// Resample every channel to `to_rate`, leaving the channel count alone.
    pub fn resample(samples: Vec<Vec<f32>>, from_rate: u32, to_rate: u32) -> Result<Vec<Vec<f32>>> {
        if from_rate == to_rate || samples.is_empty() || samples[0].is_empty() {
            return Ok(samples);
        }
        let _span = perf::span(Metric::AudioResample);

        let channels = samples.len();
        let input_len = samples[0].len();
        let ratio = to_rate as f64 / from_rate as f64;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_len, channels)?;
        let mut output = resampler.process(&samples, None)?;

        // Trim the sinc filter tail so the length tracks the rate ratio.
        let expected = (input_len as f64 * ratio).round() as usize;
        for channel in &mut output {
            channel.truncate(expected);
        }
        Ok(output)
    }

    pub fn convert_audio(
        samples: Vec<Vec<f32>>,
        from_rate: u32,
        to_rate: u32,
        to_channels: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let samples = convert_channels(samples, to_channels)?;
        Self::resample(samples, from_rate, to_rate)
    }
}

fn convert_channels(samples: Vec<Vec<f32>>, to_channels: usize) -> Result<Vec<Vec<f32>>> {
    if samples.is_empty() {
        return Ok(samples);
    }
    let from_channels = samples.len();
    if from_channels == to_channels {
        return Ok(samples);
    }
    if to_channels == 1 {
        let len = samples[0].len();
        let mut mixed = vec![0.0_f32; len];
        for channel in &samples {
            if channel.len() != len {
                anyhow::bail!("Channel length mismatch in audio conversion");
            }
            for (idx, value) in channel.iter().enumerate() {
                mixed[idx] += *value;
            }
        }
        let scale = 1.0 / from_channels as f32;
        for value in &mut mixed {
            *value *= scale;
        }
        return Ok(vec![mixed]);
    }
    anyhow::bail!("Unsupported channel conversion from {from_channels} to {to_channels}")
}

#[cfg(test)]
mod tests {
    use super::AudioResampler;

    #[test]
    fn resample_tracks_rate_ratio() {
        let samples = vec![vec![0.0_f32; 4800], vec![0.0_f32; 4800]];
        let output = AudioResampler::resample(samples, 48000, 44100).expect("resample");
        assert_eq!(output.len(), 2);
        assert!(output[0].len() <= 4410);
        assert!(output[0].len() > 4000);
    }

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![vec![0.25_f32; 10]];
        let output = AudioResampler::resample(samples.clone(), 16000, 16000).expect("resample");
        assert_eq!(output, samples);
    }

    #[test]
    fn downmix_averages_channels() {
        let samples = vec![vec![1.0_f32, 0.0], vec![0.0_f32, 1.0]];
        let output = AudioResampler::convert_audio(samples, 8000, 8000, 1).expect("convert");
        assert_eq!(output, vec![vec![0.5, 0.5]]);
    }

    #[test]
    fn upmix_is_rejected() {
        let samples = vec![vec![0.5_f32; 4]];
        assert!(AudioResampler::convert_audio(samples, 8000, 8000, 2).is_err());
    }
}
