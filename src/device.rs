//! Compute device selection.
//!
//! `auto` probes Metal (through the wgpu backend) first, then CUDA, and falls
//! back to the ndarray CPU backend. Accelerated backends are cargo features;
//! a backend that is not compiled in is simply unavailable.

use anyhow::Result;
use clap::ValueEnum;
use std::fmt;

/// Device requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "lower")]
pub enum DeviceChoice {
    /// Pick the best available device.
    #[default]
    Auto,
    Cpu,
    Cuda,
    Mps,
}

/// Device a run actually executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Mps,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComputeDevice::Cpu => "cpu",
            ComputeDevice::Cuda => "cuda",
            ComputeDevice::Mps => "mps",
        };
        f.write_str(name)
    }
}

/// Resolve a [`DeviceChoice`] into a concrete device.
pub fn select_device(choice: DeviceChoice) -> Result<ComputeDevice> {
    let device = match choice {
        DeviceChoice::Cpu => ComputeDevice::Cpu,
        DeviceChoice::Cuda => {
            if !cfg!(feature = "backend-cuda") {
                anyhow::bail!("CUDA support not compiled in; build with --features backend-cuda");
            }
            ComputeDevice::Cuda
        }
        DeviceChoice::Mps => {
            if !cfg!(feature = "backend-wgpu") {
                anyhow::bail!("MPS support not compiled in; build with --features backend-wgpu");
            }
            if !cfg!(target_os = "macos") {
                anyhow::bail!("MPS is only available on macOS; use --device cpu or cuda");
            }
            ComputeDevice::Mps
        }
        DeviceChoice::Auto => {
            if mps_available() {
                log::info!("Using MPS device");
                return Ok(ComputeDevice::Mps);
            }
            if cuda_available() {
                log::info!("Using CUDA device");
                return Ok(ComputeDevice::Cuda);
            }
            log::info!("Using CPU as fallback device");
            return Ok(ComputeDevice::Cpu);
        }
    };
    log::info!("Using user-specified device: {device}");
    Ok(device)
}

/// Run a backend probe, treating a panic during backend init as "unavailable".
#[allow(dead_code)]
fn probe(name: &str, check: impl FnOnce() + std::panic::UnwindSafe) -> bool {
    match std::panic::catch_unwind(check) {
        Ok(()) => true,
        Err(_) => {
            log::warn!("{name} probe failed; device unavailable");
            false
        }
    }
}

#[cfg(all(feature = "backend-wgpu", target_os = "macos"))]
fn mps_available() -> bool {
    probe("MPS", || {
        let device = mps_device();
        let _ = burn::tensor::Tensor::<burn_wgpu::Wgpu, 1>::zeros([1], &device).into_data();
    })
}

#[cfg(not(all(feature = "backend-wgpu", target_os = "macos")))]
fn mps_available() -> bool {
    false
}

#[cfg(feature = "backend-cuda")]
fn cuda_available() -> bool {
    probe("CUDA", || {
        let device = burn_cuda::CudaDevice::default();
        let _ = burn::tensor::Tensor::<burn_cuda::Cuda, 1>::zeros([1], &device).into_data();
    })
}

#[cfg(not(feature = "backend-cuda"))]
fn cuda_available() -> bool {
    false
}

/// The Metal device of the wgpu backend, initialised once per process.
#[cfg(feature = "backend-wgpu")]
pub fn mps_device() -> burn_wgpu::WgpuDevice {
    static SETUP: std::sync::Once = std::sync::Once::new();
    let device = burn_wgpu::WgpuDevice::default();
    SETUP.call_once(|| {
        burn_wgpu::init_setup::<burn_wgpu::graphics::Metal>(&device, Default::default());
    });
    device
}

#[cfg(test)]
mod tests {
    use super::{probe, select_device, ComputeDevice, DeviceChoice};

    #[test]
    fn explicit_cpu_is_honoured() {
        assert_eq!(select_device(DeviceChoice::Cpu).unwrap(), ComputeDevice::Cpu);
    }

    #[test]
    fn explicit_mps_needs_feature_and_macos() {
        let result = select_device(DeviceChoice::Mps);
        if cfg!(all(feature = "backend-wgpu", target_os = "macos")) {
            assert_eq!(result.expect("mps"), ComputeDevice::Mps);
        } else {
            assert!(result.is_err());
        }
    }

    #[test]
    fn auto_always_resolves() {
        let device = select_device(DeviceChoice::Auto).expect("auto");
        if !cfg!(any(feature = "backend-wgpu", feature = "backend-cuda")) {
            assert_eq!(device, ComputeDevice::Cpu);
        }
    }

    #[cfg(not(feature = "backend-cuda"))]
    #[test]
    fn missing_backend_names_the_feature() {
        let err = select_device(DeviceChoice::Cuda).unwrap_err();
        assert!(err.to_string().contains("backend-cuda"));
    }

    #[test]
    fn panicking_probe_reports_unavailable() {
        assert!(probe("ok", || {}));
        assert!(!probe("broken", || panic!("no driver")));
    }

    #[test]
    fn device_names_match_cli_values() {
        assert_eq!(ComputeDevice::Mps.to_string(), "mps");
        assert_eq!(ComputeDevice::Cuda.to_string(), "cuda");
    }
}
