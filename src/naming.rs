//! Output file naming: `{class}--param1-{NN.NN}.dac` and collision-free destinations.

use std::path::{Path, PathBuf};

/// Clamp `value` into `[0, 1]`. NaN maps to the upper bound.
pub fn clamp_param(value: f64) -> f64 {
    if value.is_nan() || value >= 1.0 {
        1.0
    } else if value <= 0.0 {
        // Also folds -0.0, which would otherwise print with a sign.
        0.0
    } else {
        value
    }
}

/// Format a parameter as exactly five characters, e.g. `0.5 -> "00.50"`.
pub fn format_param_value(value: f64) -> String {
    let mut formatted = format!("{:05.2}", clamp_param(value));
    formatted.truncate(5);
    formatted
}

/// `{class_name}--param1-{NN.NN}.dac`
pub fn output_filename(class_name: &str, param1: f64) -> String {
    format!("{class_name}--param1-{}.dac", format_param_value(param1))
}

/// `dir/name`, or the first free `dir/{name}_{n}`.
pub fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !exists(&candidate) {
        return candidate;
    }
    (1..)
        .map(|suffix| dir.join(format!("{name}_{suffix}")))
        .find(|path| !exists(path))
        .unwrap_or(candidate)
}

/// Like [`unique_destination`] but keeps the extension last: `stem_{n}.ext`.
pub fn unique_file_name(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !exists(&candidate) {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|suffix| match ext {
            Some(ext) => dir.join(format!("{stem}_{suffix}.{ext}")),
            None => dir.join(format!("{stem}_{suffix}")),
        })
        .find(|path| !exists(path))
        .unwrap_or(candidate)
}

/// Existence check that also counts dangling symlinks as taken.
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
