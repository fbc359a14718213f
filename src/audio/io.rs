use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::perf::{self, Metric};

/// Planar samples (`[channel][frame]`) together with their sample rate.
pub type AudioBuffer = (Vec<Vec<f32>>, u32);

#[derive(Debug, Default)]
pub struct WavIo;

impl WavIo {
    /// Read any supported audio file, choosing the decoder from the extension.
    pub fn read_audio(path: impl AsRef<Path>) -> Result<AudioBuffer> {
        let path = path.as_ref();
        let _span = perf::span(Metric::AudioDecode);
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav {
            Self::read_wav(path)
        } else {
            Self::read_compressed(path)
        }
    }

    pub fn read_wav(path: impl AsRef<Path>) -> Result<AudioBuffer> {
        let path = path.as_ref();
        let mut reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        let sample_rate = spec.sample_rate;
        let mut samples = vec![Vec::new(); channels];

        match spec.sample_format {
            SampleFormat::Float => {
                for (idx, sample) in reader.samples::<f32>().enumerate() {
                    let value = sample?;
                    samples[idx % channels].push(value);
                }
            }
            SampleFormat::Int => {
                let max = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                for (idx, sample) in reader.samples::<i32>().enumerate() {
                    let value = sample? as f32 / max;
                    samples[idx % channels].push(value);
                }
            }
        }

        Ok((samples, sample_rate))
    }

    /// Decode MP3 (and anything else symphonia can probe) into planar f32.
    fn read_compressed(path: &Path) -> Result<AudioBuffer> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", path.display()))?;
        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow::anyhow!("No audio tracks found in {}", path.display()))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| anyhow::anyhow!("Unknown sample rate in {}", path.display()))?;
        let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| anyhow::anyhow!("Failed to create decoder: {e}"))?;
        let track_id = track.id;

        let mut interleaved = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => anyhow::bail!("Decode error in {}: {e}", path.display()),
            };
            if packet.track_id() != track_id {
                continue;
            }
            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet in {}: {e}", path.display());
                    continue;
                }
                Err(e) => anyhow::bail!("Decode error in {}: {e}", path.display()),
            };
            let spec = *decoded.spec();
            channels = spec.channels.count();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buffer.samples());
        }

        Ok((deinterleave(&interleaved, channels), sample_rate))
    }

    pub fn write_wav(
        path: impl AsRef<Path>,
        samples: &[Vec<f32>],
        sample_rate: u32,
    ) -> Result<()> {
        if samples.is_empty() {
            anyhow::bail!("No audio channels provided");
        }
        let channels = samples.len() as u16;
        let len = samples[0].len();
        for channel in samples.iter().skip(1) {
            if channel.len() != len {
                anyhow::bail!("Channel length mismatch in WAV write");
            }
        }

        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let path = path.as_ref();
        let mut writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        for idx in 0..len {
            for channel in samples {
                let value = channel[idx].clamp(-1.0, 1.0);
                let scaled = (value * i16::MAX as f32).round() as i16;
                writer.write_sample(scaled)?;
            }
        }

        writer.finalize()?;
        Ok(())
    }
}

fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let mut planar = vec![Vec::with_capacity(interleaved.len() / channels); channels];
    for (idx, value) in interleaved.iter().enumerate() {
        planar[idx % channels].push(*value);
    }
    planar
}

/// Duration in seconds of a planar buffer.
pub fn duration_seconds(samples: &[Vec<f32>], sample_rate: u32) -> f64 {
    let frames = samples.first().map(Vec::len).unwrap_or(0);
    frames as f64 / sample_rate as f64
}
