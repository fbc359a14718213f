//! # dacprep - dataset preparation for DAC audio-token pipelines
//!
//! Tools that take a folder of recordings to a train/validation split of
//! Descript Audio Codec (DAC) token files:
//!
//! 1. **Encoding** ([`encode`], [`DacEncoder`]): WAV/MP3 files are resampled,
//!    loudness-normalised and run through the DAC encoder and residual vector
//!    quantizer. Codes land in `{class}--param1-{NN.NN}.dac` files ([`naming`],
//!    [`dac_file`]).
//! 2. **Tidying** ([`rename`], [`flatten`]): normalise file names and pull files
//!    out of `*.dac` directories without ever overwriting.
//! 3. **Splitting** ([`dataset::split`]): draw a reproducible per-class
//!    train/validation split from a labelled spreadsheet.
//! 4. **Routing** ([`dataset::reorganize`]): copy or move files into
//!    train/validation directories according to the split spreadsheets.
//! 5. **Excerpts** ([`segment`]): cut a random fixed-length segment from a WAV file.
//!
//! ## Quick Start
//!
//! ```no_run
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use dacprep::{audio::io::WavIo, config::preset, CompressOptions, DacEncoder};
//!
//! let config = preset("44khz", "8kbps").unwrap();
//! let device = NdArrayDevice::default();
//! let model = DacEncoder::<NdArray<f32>>::from_config(&config, &device).unwrap();
//!
//! let (samples, sample_rate) = WavIo::read_audio("clip.wav").unwrap();
//! let dac = model
//!     .compress(samples, sample_rate, &CompressOptions::default())
//!     .unwrap();
//! dac.save("Zelda--param1-00.50.dac").unwrap();
//! ```
//!
//! ## Configuration
//!
//! Codec architectures come from built-in presets ([`config::preset`]) or a YAML
//! file ([`load_config`]). Weights can be local files, `https://` URLs or
//! `hf://owner/repo/file` paths fetched from HuggingFace Hub.

// Public modules - these are part of the stable API
pub mod audio;
pub mod config;
pub mod dac_file;
pub mod dataset;
pub mod device;
pub mod download;
pub mod encode;
pub mod flatten;
pub mod naming;
pub mod perf;
pub mod rename;
pub mod segment;

// Internal modules - exposed for integration tests but not part of stable API.
// These may change without notice between versions.
#[doc(hidden)]
pub mod model;
#[doc(hidden)]
pub mod modules;
#[doc(hidden)]
pub mod weights;

// Re-exports forming the public API
pub use config::{load_config, CodecConfig};
pub use dac_file::{DacFile, DacMetadata};
pub use download::download_if_necessary;
pub use model::{CompressOptions, DacEncoder};
