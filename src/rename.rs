//! Strip trailing decorations from encoded file names, so that
//! `Zelda--param1-00.50_3 (copy).dac` becomes `Zelda--param1-00.50.dac`.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Counts reported after a rename pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenameSummary {
    pub renamed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub unmatched: usize,
}

/// Pattern keeping `{class}--param1-N.N` and the `.dac` extension.
///
/// `None` accepts any class label.
pub fn name_pattern(class_name: Option<&str>) -> Result<Regex> {
    let class = match class_name {
        Some(name) => regex::escape(name),
        None => ".+?".to_string(),
    };
    Ok(Regex::new(&format!(r"^({class}--param1-\d+\.\d+).*?(\.dac)"))?)
}

/// Canonical name for `file_name`, or `None` when it does not follow the convention.
pub fn canonical_name(pattern: &Regex, file_name: &str) -> Option<String> {
    let captures = pattern.captures(file_name)?;
    Some(format!("{}{}", &captures[1], &captures[2]))
}

/// Rename every `*.dac` file in `dir` to its canonical name.
pub fn rename_dac_files(dir: &Path, class_name: Option<&str>) -> Result<RenameSummary> {
    let mut summary = RenameSummary::default();
    if !dir.is_dir() {
        log::error!("Directory {} does not exist", dir.display());
        return Ok(summary);
    }
    let pattern = name_pattern(class_name)?;

    let mut names: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".dac") && !name.starts_with('.'))
        .collect();
    names.sort();

    for name in names {
        let Some(new_name) = canonical_name(&pattern, &name) else {
            log::warn!("{name} does not match the expected pattern, skipping");
            summary.unmatched += 1;
            continue;
        };
        if new_name == name {
            summary.unchanged += 1;
            continue;
        }
        let destination = dir.join(&new_name);
        if destination.symlink_metadata().is_ok() {
            log::warn!("{new_name} already exists, skipping {name}");
            summary.skipped += 1;
            continue;
        }
        log::info!("Renaming {name} -> {new_name}");
        fs::rename(dir.join(&name), &destination)
            .with_context(|| format!("Failed to rename {name}"))?;
        summary.renamed += 1;
    }

    log::info!(
        "Processed files in {}: {} renamed, {} unchanged, {} skipped, {} unmatched",
        dir.display(),
        summary.renamed,
        summary.unchanged,
        summary.skipped,
        summary.unmatched
    );
    Ok(summary)
}
