//! Shared test utilities for building fixtures and running the CLI.

#![allow(dead_code)]

use dacprep::audio::io::WavIo;
use dacprep::dataset::{Cell, Sheet};
use std::path::Path;
use std::process::{Command, Output};

/// Run the `dacprep` binary with `args`, capturing its output.
pub fn dacprep(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dacprep"))
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run dacprep {args:?}: {e}"))
}

/// Assert the command exited successfully, showing stderr otherwise.
pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "dacprep failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Write a stereo sine wave of `seconds` length.
pub fn write_tone(path: &Path, seconds: f32, sample_rate: u32) {
    let len = (seconds * sample_rate as f32) as usize;
    let tone: Vec<f32> = (0..len)
        .map(|i| 0.25 * (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin())
        .collect();
    WavIo::write_wav(path, &[tone.clone(), tone], sample_rate).expect("write tone");
}

/// Write a spreadsheet with the given header and string rows.
pub fn write_sheet(path: &Path, headers: &[&str], rows: &[Vec<&str>]) {
    let mut sheet = Sheet::new(headers.iter().map(|h| h.to_string()).collect());
    for row in rows {
        sheet.rows.push(row.iter().map(|value| Cell::from(*value)).collect());
    }
    sheet.write(path).expect("write sheet");
}

/// Sorted file names directly inside `dir`.
pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}
