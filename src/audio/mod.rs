//! Audio I/O, resampling and loudness helpers used by the encode and extract tools.
//!
//! These helpers keep waveform handling separate from the codec itself, focusing on
//! decoding WAV/MP3 input, writing WAV output, and conditioning levels and rates.

pub mod io;
pub mod loudness;
pub mod resample;
