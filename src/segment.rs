//! Cut a random fixed-length excerpt out of an audio file.

use crate::audio::io::{duration_seconds, WavIo};
use crate::audio::resample::AudioResampler;
use anyhow::Result;
use rand::Rng;
use std::path::Path;

/// Where the excerpt was taken from, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extraction {
    /// The input was no longer than the requested duration and was copied whole.
    Whole { duration: f64 },
    Segment { start: f64, end: f64 },
}

/// Sample range `[start, end)` for an excerpt starting at `start_time` seconds.
pub fn segment_bounds(start_time: f64, duration: f64, sample_rate: u32) -> (usize, usize) {
    let start = (start_time * sample_rate as f64).floor() as usize;
    let len = (duration * sample_rate as f64).floor() as usize;
    (start, start + len)
}

/// Write a random `duration`-second excerpt of `input` (mixed to mono) to `output`.
pub fn extract_random_segment<R: Rng>(
    input: &Path,
    output: &Path,
    duration: f64,
    rng: &mut R,
) -> Result<Extraction> {
    if duration.is_nan() || duration <= 0.0 {
        anyhow::bail!("segment duration must be positive, got {duration}");
    }
    let (samples, sample_rate) = WavIo::read_audio(input)?;
    let mono = AudioResampler::convert_audio(samples, sample_rate, sample_rate, 1)?;
    let total = duration_seconds(&mono, sample_rate);

    if total <= duration {
        log::info!("Audio file is too short for a random segment. Copying entire file.");
        WavIo::write_wav(output, &mono, sample_rate)?;
        return Ok(Extraction::Whole { duration: total });
    }

    let start_time = rng.random_range(0.0..(total - duration));
    let (start, end) = segment_bounds(start_time, duration, sample_rate);
    let end = end.min(mono[0].len());
    let segment = vec![mono[0][start..end].to_vec()];
    WavIo::write_wav(output, &segment, sample_rate)?;
    log::info!(
        "Extracted segment from {:.2} to {:.2} seconds.",
        start_time,
        start_time + duration
    );
    Ok(Extraction::Segment {
        start: start_time,
        end: start_time + duration,
    })
}
