//! Integrated loudness measurement and gain normalisation (EBU R128).

use anyhow::Result;
use ebur128::{EbuR128, Mode};

/// Floor applied to measured loudness; silence would otherwise be `-inf`.
pub const MIN_LOUDNESS_LUFS: f64 = -70.0;

/// Measure the integrated loudness of a planar buffer in LUFS.
pub fn integrated_loudness(samples: &[Vec<f32>], sample_rate: u32) -> Result<f64> {
    if samples.is_empty() || samples[0].is_empty() {
        return Ok(MIN_LOUDNESS_LUFS);
    }
    let mut meter = EbuR128::new(samples.len() as u32, sample_rate, Mode::I)
        .map_err(|e| anyhow::anyhow!("Failed to create loudness meter: {e}"))?;
    let planes: Vec<&[f32]> = samples.iter().map(Vec::as_slice).collect();
    meter
        .add_frames_planar_f32(&planes)
        .map_err(|e| anyhow::anyhow!("Loudness measurement failed: {e}"))?;
    let lufs = meter
        .loudness_global()
        .map_err(|e| anyhow::anyhow!("Loudness measurement failed: {e}"))?;
    if lufs.is_finite() {
        Ok(lufs.max(MIN_LOUDNESS_LUFS))
    } else {
        Ok(MIN_LOUDNESS_LUFS)
    }
}

/// Apply the gain that moves `current_lufs` to `target_lufs`.
pub fn normalize(samples: &mut [Vec<f32>], current_lufs: f64, target_lufs: f64) {
    let gain = 10f64.powf((target_lufs - current_lufs) / 20.0) as f32;
    for channel in samples.iter_mut() {
        for value in channel.iter_mut() {
            *value *= gain;
        }
    }
}

/// Scale down any channel whose peak exceeds `max_peak`.
pub fn ensure_max_peak(samples: &mut [Vec<f32>], max_peak: f32) {
    for channel in samples.iter_mut() {
        let peak = channel.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
        if peak > max_peak {
            let scale = max_peak / peak;
            for value in channel.iter_mut() {
                *value *= scale;
            }
        }
    }
}
