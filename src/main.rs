//! Command-line interface for the dataset preparation tools.
//!
//! Each subcommand wraps one library pipeline: encoding audio to `.dac`
//! files, tidying names, splitting spreadsheets, routing files and cutting
//! excerpts.

#![recursion_limit = "256"]

use anyhow::Result;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Parser, Subcommand};
use dacprep::config::{available_presets, load_config, preset, CodecConfig};
use dacprep::dataset::{self, ReorganizeOptions, SplitOptions};
use dacprep::device::{select_device, ComputeDevice, DeviceChoice};
use dacprep::encode::{self, EncodeOptions};
use dacprep::model::CompressOptions;
use dacprep::{flatten, perf, rename, segment};
use rand::{rngs::StdRng, SeedableRng};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "dacprep")]
#[command(about = "Dataset preparation tools for DAC audio-token pipelines", long_about = None)]
struct Cli {
    /// Print performance summary at the end of the run.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Encode WAV/MP3 audio into .dac files named after a class and parameter.
    Encode(EncodeArgs),
    /// Strip trailing decorations from .dac file names.
    Rename {
        /// Directory holding the .dac files.
        #[arg(default_value = "data/dac-raw")]
        dir: PathBuf,
        /// Class label the names start with.
        #[arg(long, alias = "class_name", default_value = "Zelda")]
        class_name: String,
        /// Accept any class label.
        #[arg(long, conflicts_with = "class_name")]
        any_class: bool,
    },
    /// Move files out of *.dac subdirectories.
    Flatten {
        /// Directory containing the .dac subdirectories.
        #[arg(long, alias = "target_dir", default_value = ".")]
        target_dir: PathBuf,
    },
    /// Copy or move .dac files according to train/val spreadsheets.
    Reorganize {
        /// Training split spreadsheet.
        #[arg(long)]
        train_excel: PathBuf,
        /// Validation split spreadsheet.
        #[arg(long)]
        val_excel: PathBuf,
        /// Directory containing the .dac files.
        #[arg(long, default_value = "data/dac-raw")]
        source_dir: PathBuf,
        /// Destination for training files.
        #[arg(long, default_value = "data/dac-train")]
        train_dir: PathBuf,
        /// Destination for validation files.
        #[arg(long, default_value = "data/dac-val")]
        val_dir: PathBuf,
        /// Move files instead of copying them.
        #[arg(long = "move")]
        move_files: bool,
    },
    /// Split a labelled spreadsheet into train and validation spreadsheets.
    Split {
        /// Input spreadsheet with a "Class Name" column.
        input: PathBuf,
        /// Output directory (default: the input's directory).
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Samples drawn per class.
        #[arg(long, default_value_t = 25)]
        samples: usize,
        /// Share of samples placed in the training set.
        #[arg(long, default_value_t = 0.8)]
        train_ratio: f64,
        /// Random seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Extract a random fixed-length segment from an audio file.
    Extract {
        /// Input audio file.
        #[arg(default_value = "input.wav")]
        input: PathBuf,
        /// Output WAV path.
        #[arg(default_value = "output_segment.wav")]
        output: PathBuf,
        /// Segment length in seconds.
        #[arg(long, default_value_t = 5.0)]
        duration: f64,
        /// Random seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List available codec models.
    Models,
    /// Download codec weights.
    Download {
        /// Model as `type/bitrate`, e.g. `44khz/8kbps`.
        model: String,
    },
}

#[derive(clap::Args, Debug)]
struct EncodeArgs {
    /// Directory of input audio files, or a single file.
    #[arg(long, alias = "input_dir")]
    input_dir: PathBuf,
    /// Directory for encoded files.
    #[arg(long, alias = "output_dir")]
    output_dir: PathBuf,
    /// Model bitrate.
    #[arg(long, alias = "model_bitrate", default_value = "8kbps")]
    model_bitrate: String,
    /// Model type.
    #[arg(long, alias = "model_type", default_value = "44khz")]
    model_type: String,
    /// Number of quantizers kept.
    #[arg(long, alias = "n_quantizers", default_value_t = 4)]
    n_quantizers: usize,
    /// Device to use.
    #[arg(long, value_enum, default_value_t = DeviceChoice::Auto)]
    device: DeviceChoice,
    /// Windows encoded per forward pass.
    #[arg(long, alias = "batch_size", default_value_t = 1)]
    batch_size: usize,
    /// Class name used in output file names.
    #[arg(long, alias = "class_name")]
    class_name: String,
    /// Parameter value between 0.0 and 1.0.
    #[arg(long, default_value_t = 1.0)]
    param1: f64,
    /// Randomize param1 per file.
    #[arg(long, alias = "randomize_param1")]
    randomize_param1: bool,
    /// Window length in seconds for long inputs; 0 encodes in one pass.
    #[arg(long, alias = "win_duration", default_value_t = 5.0)]
    win_duration: f64,
    /// Seed for randomized param1.
    #[arg(long)]
    seed: Option<u64>,
    /// Codec configuration YAML (overrides --model-type/--model-bitrate).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Weights path or URL (overrides the configured weights).
    #[arg(long)]
    weights: Option<String>,
}

/// Entry point for the CLI.
fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = run(cli.command);
    if verbose {
        eprintln!("{}", perf::report());
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .try_init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Encode(args) => run_encode(args),
        Commands::Rename {
            dir,
            class_name,
            any_class,
        } => {
            let class = (!any_class).then_some(class_name.as_str());
            rename::rename_dac_files(&dir, class)?;
            Ok(())
        }
        Commands::Flatten { target_dir } => {
            flatten::flatten_dac_dirs(&target_dir)?;
            Ok(())
        }
        Commands::Reorganize {
            train_excel,
            val_excel,
            source_dir,
            train_dir,
            val_dir,
            move_files,
        } => {
            dataset::reorganize(&ReorganizeOptions {
                train_excel,
                val_excel,
                source_dir,
                train_dir,
                val_dir,
                move_files,
            })?;
            Ok(())
        }
        Commands::Split {
            input,
            output_dir,
            samples,
            train_ratio,
            seed,
        } => {
            let options = SplitOptions {
                samples_per_class: samples,
                train_ratio,
                seed,
            };
            dataset::create_train_val_split(&input, output_dir.as_deref(), &options)?;
            Ok(())
        }
        Commands::Extract {
            input,
            output,
            duration,
            seed,
        } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            segment::extract_random_segment(&input, &output, duration, &mut rng)?;
            Ok(())
        }
        Commands::Models => {
            for model in available_presets() {
                println!("{model}");
            }
            Ok(())
        }
        Commands::Download { model } => {
            let (model_type, bitrate) = model.split_once('/').ok_or_else(|| {
                anyhow::anyhow!("Expected a model as type/bitrate, e.g. 44khz/8kbps")
            })?;
            let config = preset(model_type, bitrate)?;
            let path = dacprep::download_if_necessary(&config.weights_path)?;
            println!("Downloaded {model} weights to {}", path.display());
            Ok(())
        }
    }
}

fn codec_config(args: &EncodeArgs) -> Result<CodecConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => preset(&args.model_type, &args.model_bitrate)?,
    };
    if let Some(weights) = &args.weights {
        config.weights_path = weights.clone();
    }
    Ok(config)
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    let mut options = EncodeOptions {
        input: args.input_dir.clone(),
        output_dir: args.output_dir.clone(),
        class_name: args.class_name.clone(),
        param1: args.param1,
        randomize_param1: args.randomize_param1,
        seed: args.seed,
        codec: codec_config(&args)?,
        compress: CompressOptions {
            n_quantizers: args.n_quantizers,
            win_duration: (args.win_duration > 0.0).then_some(args.win_duration),
            batch_size: args.batch_size,
            ..CompressOptions::default()
        },
    };
    if !encode::prepare(&mut options)? {
        return Ok(());
    }

    let compute = select_device(args.device)?;
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupt_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        interrupt_flag.store(true, Ordering::SeqCst);
    })?;

    match compute {
        ComputeDevice::Cpu => {
            let device = NdArrayDevice::default();
            encode::run::<NdArray<f32>>(&options, compute, &device, &interrupted)?;
        }
        ComputeDevice::Mps => {
            #[cfg(feature = "backend-wgpu")]
            {
                let device = dacprep::device::mps_device();
                encode::run::<burn_wgpu::Wgpu>(&options, compute, &device, &interrupted)?;
            }
            #[cfg(not(feature = "backend-wgpu"))]
            anyhow::bail!("MPS support not compiled in; build with --features backend-wgpu");
        }
        ComputeDevice::Cuda => {
            #[cfg(feature = "backend-cuda")]
            {
                let device = burn_cuda::CudaDevice::default();
                encode::run::<burn_cuda::Cuda>(&options, compute, &device, &interrupted)?;
            }
            #[cfg(not(feature = "backend-cuda"))]
            anyhow::bail!("CUDA support not compiled in; build with --features backend-cuda");
        }
    }
    log::info!("Encoding completed successfully!");
    Ok(())
}
