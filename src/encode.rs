//! Batch encoding of a directory (or a single file) of WAV/MP3 audio into
//! `.dac` files named after a class label and a parameter value.

use crate::{
    audio::io::WavIo,
    config::CodecConfig,
    device::ComputeDevice,
    model::{CompressOptions, DacEncoder},
    naming::{clamp_param, output_filename, unique_file_name},
    perf::{self, Metric},
};
use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything the `encode` command needs besides the device.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Directory of audio files, or one audio file.
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub class_name: String,
    pub param1: f64,
    pub randomize_param1: bool,
    /// Seed for randomised `param1`; entropy when absent.
    pub seed: Option<u64>,
    pub codec: CodecConfig,
    pub compress: CompressOptions,
}

/// Outcome of an encode run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EncodeSummary {
    pub outputs: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Clamp `param1`, create the output directory and check the input exists.
///
/// Returns `false` (after logging) when there is nothing to encode.
pub fn prepare(options: &mut EncodeOptions) -> Result<bool> {
    options.param1 = clamp_param(options.param1);
    fs::create_dir_all(&options.output_dir).with_context(|| {
        format!("Failed to create output directory {}", options.output_dir.display())
    })?;
    if !options.input.exists() {
        log::error!("Input directory {} does not exist", options.input.display());
        return Ok(false);
    }
    Ok(true)
}

/// `*.wav` files then `*.mp3` files of `dir`, each group sorted by name.
pub fn gather_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir_str = dir
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Non UTF-8 path {}", dir.display()))?;
    // The directory is matched literally; only the file name is a pattern.
    let base = PathBuf::from(glob::Pattern::escape(dir_str));
    let mut files = Vec::new();
    for ext in ["wav", "mp3"] {
        let pattern = base.join(format!("*.{ext}"));
        let pattern = pattern.to_string_lossy();
        let mut group: Vec<PathBuf> = glob::glob(&pattern)?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        group.sort();
        files.extend(group);
    }
    Ok(files)
}

/// Load the codec on `device` and encode every input.
///
/// Individual failures are logged and skipped; loading the model or an
/// interrupt ends the run with an error.
pub fn run<B: Backend>(
    options: &EncodeOptions,
    compute: ComputeDevice,
    device: &B::Device,
    interrupted: &AtomicBool,
) -> Result<EncodeSummary> {
    log::info!(
        "Encoding files from {} to {}",
        options.input.display(),
        options.output_dir.display()
    );
    log::info!("Using device: {compute}");
    log::info!(
        "Model: {}/{} ({:.2} frames/s)",
        options.codec.model_type,
        options.codec.bitrate,
        options.codec.frame_rate()
    );
    log::info!("Number of quantizers: {}", options.compress.n_quantizers);
    log::info!("Class name: {}", options.class_name);
    if options.randomize_param1 {
        log::info!("Randomizing param1 values between 0.0 and 1.0");
    } else {
        log::info!("Using param1 value: {}", options.param1);
    }

    let model = DacEncoder::<B>::from_config(&options.codec, device).inspect_err(|_| {
        device_hint(compute);
    })?;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut next_param = || {
        if options.randomize_param1 {
            rng.random::<f64>()
        } else {
            options.param1
        }
    };

    let mut summary = EncodeSummary::default();
    if options.input.is_dir() {
        let files = gather_inputs(&options.input)?;
        log::info!(
            "Found {} audio files in directory: {}",
            files.len(),
            options.input.display()
        );
        for file in files {
            if interrupted.load(Ordering::SeqCst) {
                anyhow::bail!("Interrupted");
            }
            let name = output_filename(&options.class_name, next_param());
            let output = unique_file_name(&options.output_dir, &name);
            log::info!("Processing {} -> {}", display_name(&file), display_name(&output));
            record(&mut summary, &model, &file, output, options, compute);
        }
        log::info!("All files encoded to: {}", options.output_dir.display());
    } else {
        let name = output_filename(&options.class_name, next_param());
        let output = unique_file_name(&options.output_dir, &name);
        if record(&mut summary, &model, &options.input, output.clone(), options, compute) {
            log::info!("Encoded single file to: {}", output.display());
        }
    }

    log::info!(
        "Encoding finished: {} encoded, {} failed",
        summary.outputs.len(),
        summary.failed.len()
    );
    Ok(summary)
}

/// Encode one file into `output`, logging rather than propagating failures.
fn record<B: Backend>(
    summary: &mut EncodeSummary,
    model: &DacEncoder<B>,
    input: &Path,
    output: PathBuf,
    options: &EncodeOptions,
    compute: ComputeDevice,
) -> bool {
    match encode_file(model, input, &output, &options.compress) {
        Ok(()) => {
            summary.outputs.push(output);
            true
        }
        Err(err) => {
            log::error!("Error during encoding of {}: {err:#}", input.display());
            device_hint(compute);
            summary.failed.push(input.to_path_buf());
            false
        }
    }
}

/// Decode `input`, compress it and write the `.dac` file.
pub fn encode_file<B: Backend>(
    model: &DacEncoder<B>,
    input: &Path,
    output: &Path,
    options: &CompressOptions,
) -> Result<()> {
    let (samples, sample_rate) = WavIo::read_audio(input)?;
    let dac = model.compress(samples, sample_rate, options)?;
    log::debug!(
        "{}: {} channel(s), {} codebooks, {} frames",
        display_name(output),
        dac.channels(),
        dac.n_quantizers(),
        dac.frames()
    );
    {
        let _span = perf::span(Metric::DacFileWrite);
        dac.save(output)?;
    }
    perf::add_count(Metric::FilesEncoded, 1);
    Ok(())
}

fn device_hint(compute: ComputeDevice) {
    if compute != ComputeDevice::Cpu {
        log::info!("If {compute} error, try again with --device cpu");
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::{encode_file, gather_inputs, prepare, run, EncodeOptions};
    use crate::audio::io::WavIo;
    use crate::config::preset;
    use crate::dac_file::DacFile;
    use crate::device::ComputeDevice;
    use crate::model::{CompressOptions, DacEncoder};
    use crate::modules::test_support::{tiny_config, tiny_state_dict, write_tiny_checkpoint};
    use burn_ndarray::{NdArray, NdArrayDevice};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;

    fn options(input: &std::path::Path, output: &std::path::Path) -> EncodeOptions {
        EncodeOptions {
            input: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            class_name: "Zelda".to_string(),
            param1: 3.0,
            randomize_param1: false,
            seed: None,
            codec: preset("44khz", "8kbps").expect("preset"),
            compress: CompressOptions::default(),
        }
    }

    #[test]
    fn gathers_wav_before_mp3_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.mp3", "b.wav", "a.mp3", "a.wav", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }
        fs::create_dir(dir.path().join("nested.wav")).expect("mkdir");
        let names: Vec<String> = gather_inputs(dir.path())
            .expect("gather")
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.wav", "b.wav", "a.mp3", "b.mp3"]);
    }

    #[test]
    fn gathers_from_directories_with_pattern_characters() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("set[1]");
        fs::create_dir(&dir).expect("mkdir");
        fs::write(dir.join("a.wav"), b"x").expect("write");
        fs::write(root.path().join("set1"), b"decoy").expect("write");

        let files = gather_inputs(&dir).expect("gather");
        assert_eq!(files, vec![dir.join("a.wav")]);
    }

    #[test]
    fn prepare_clamps_and_reports_missing_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out/nested");
        let mut opts = options(&dir.path().join("missing"), &output);
        assert!(!prepare(&mut opts).expect("prepare"));
        assert_eq!(opts.param1, 1.0);
        assert!(output.is_dir());

        let mut opts = options(dir.path(), &output);
        assert!(prepare(&mut opts).expect("prepare"));
    }

    #[test]
    fn encodes_wav_into_dac_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("clip.wav");
        let samples: Vec<f32> = (0..160).map(|i| (i as f32 * 0.1).sin() * 0.4).collect();
        WavIo::write_wav(&input, &[samples], 8000).expect("write wav");

        let model = DacEncoder::<NdArray<f32>>::from_state_dict(
            tiny_config(),
            &tiny_state_dict(),
            &NdArrayDevice::default(),
        )
        .expect("model");
        let output = dir.path().join("clip.dac");
        let compress = CompressOptions {
            n_quantizers: 2,
            ..CompressOptions::default()
        };
        encode_file(&model, &input, &output, &compress).expect("encode");

        let dac = DacFile::load(&output).expect("load");
        assert_eq!(dac.shape, [1, 2, 40]);
        assert_eq!(dac.metadata.original_length, 160);
    }

    fn write_clip(path: &Path) {
        let samples: Vec<f32> = (0..160).map(|i| (i as f32 * 0.1).sin() * 0.4).collect();
        WavIo::write_wav(path, &[samples], 8000).expect("write wav");
    }

    /// Options running the tiny checkpoint written under `root`.
    fn tiny_options(root: &Path, input: PathBuf, output: &str) -> EncodeOptions {
        let weights = root.join("tiny.safetensors");
        if !weights.exists() {
            write_tiny_checkpoint(&weights);
        }
        let mut codec = tiny_config();
        codec.weights_path = weights.to_string_lossy().into_owned();
        let mut opts = EncodeOptions {
            input,
            output_dir: root.join(output),
            class_name: "Zelda".to_string(),
            param1: 0.5,
            randomize_param1: false,
            seed: None,
            codec,
            compress: CompressOptions {
                n_quantizers: 2,
                ..CompressOptions::default()
            },
        };
        assert!(prepare(&mut opts).expect("prepare"));
        opts
    }

    fn run_cpu(opts: &EncodeOptions, interrupted: bool) -> anyhow::Result<super::EncodeSummary> {
        run::<NdArray<f32>>(
            opts,
            ComputeDevice::Cpu,
            &NdArrayDevice::default(),
            &AtomicBool::new(interrupted),
        )
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn run_skips_broken_files_and_keeps_names_unique() {
        let root = tempfile::tempdir().expect("tempdir");
        let input = root.path().join("in");
        fs::create_dir(&input).expect("mkdir");
        write_clip(&input.join("a.wav"));
        write_clip(&input.join("b.wav"));
        fs::write(input.join("broken.wav"), b"not audio").expect("write");

        let opts = tiny_options(root.path(), input, "out");
        let summary = run_cpu(&opts, false).expect("run");
        assert_eq!(
            file_names(&summary.outputs),
            ["Zelda--param1-00.50.dac", "Zelda--param1-00.50_1.dac"]
        );
        assert_eq!(file_names(&summary.failed), ["broken.wav"]);
        for output in &summary.outputs {
            let dac = DacFile::load(output).expect("load");
            assert_eq!(dac.shape, [1, 2, 40]);
        }
    }

    #[test]
    fn run_encodes_single_file_with_seeded_param() {
        let root = tempfile::tempdir().expect("tempdir");
        let clip = root.path().join("clip.wav");
        write_clip(&clip);

        let names: Vec<Vec<String>> = ["first", "second"]
            .into_iter()
            .map(|out| {
                let mut opts = tiny_options(root.path(), clip.clone(), out);
                opts.randomize_param1 = true;
                opts.seed = Some(9);
                let summary = run_cpu(&opts, false).expect("run");
                assert!(summary.failed.is_empty());
                file_names(&summary.outputs)
            })
            .collect();
        assert_eq!(names[0].len(), 1);
        assert_eq!(names[0], names[1]);
        assert!(names[0][0].starts_with("Zelda--param1-"));
        assert!(names[0][0].ends_with(".dac"));
    }

    #[test]
    fn run_stops_when_interrupted() {
        let root = tempfile::tempdir().expect("tempdir");
        let input = root.path().join("in");
        fs::create_dir(&input).expect("mkdir");
        write_clip(&input.join("a.wav"));

        let opts = tiny_options(root.path(), input, "out");
        let err = run_cpu(&opts, true).unwrap_err();
        assert!(err.to_string().contains("Interrupted"));
        assert!(fs::read_dir(&opts.output_dir).expect("read dir").next().is_none());
    }
}
