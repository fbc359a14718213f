//! The DAC codec model: weight loading, delay geometry and windowed compression.

pub mod codec;

pub use codec::{codec_geometry, CompressOptions, DacEncoder, DEFAULT_NORMALIZE_DB};
