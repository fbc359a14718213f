//! Copy (or move) encoded files into train/validation directories according
//! to the split spreadsheets.

use crate::dataset::sheet::{Sheet, FILE_COLUMN};
use crate::flatten::move_file;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorganizeOptions {
    pub train_excel: PathBuf,
    pub val_excel: PathBuf,
    pub source_dir: PathBuf,
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    /// Move instead of copy.
    pub move_files: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReorganizeSummary {
    pub transferred: usize,
    pub missing: usize,
}

/// Route every file listed in the train/val sheets from `source_dir`.
pub fn reorganize(options: &ReorganizeOptions) -> Result<ReorganizeSummary> {
    for dir in [&options.train_dir, &options.val_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    log::info!("Reading Excel files...");
    let (train_files, val_files) =
        match (file_names(&options.train_excel), file_names(&options.val_excel)) {
            (Ok(train), Ok(val)) => (train, val),
            (Err(err), _) | (_, Err(err)) => {
                log::error!("Error reading Excel files: {err:#}");
                return Ok(ReorganizeSummary::default());
            }
        };
    log::info!(
        "Found {} training files and {} validation files",
        train_files.len(),
        val_files.len()
    );

    let available: HashSet<String> = fs::read_dir(&options.source_dir)
        .with_context(|| format!("Failed to list {}", options.source_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    report_missing("training", &train_files, &available);
    report_missing("validation", &val_files, &available);

    let mut summary = ReorganizeSummary::default();
    for (files, dest, label) in [
        (&train_files, &options.train_dir, "training"),
        (&val_files, &options.val_dir, "validation"),
    ] {
        log::info!("Processing {label} files...");
        transfer(files, &options.source_dir, dest, options.move_files, &mut summary)?;
    }
    log::info!("Done!");
    Ok(summary)
}

/// Non-empty entries of the `Full File Name` column.
fn file_names(path: &Path) -> Result<Vec<String>> {
    let sheet = Sheet::read(path)?;
    let column = sheet.require_column(FILE_COLUMN)?;
    Ok(sheet
        .values(column)
        .into_iter()
        .filter(|name| !name.is_empty())
        .collect())
}

fn report_missing(label: &str, files: &[String], available: &HashSet<String>) {
    let missing: Vec<&String> = files.iter().filter(|name| !available.contains(*name)).collect();
    if missing.is_empty() {
        return;
    }
    log::warn!("{} {label} files not found in source directory", missing.len());
    if missing.len() < 10 {
        log::warn!("Missing files: {missing:?}");
    }
}

fn transfer(
    files: &[String],
    source_dir: &Path,
    dest_dir: &Path,
    move_files: bool,
    summary: &mut ReorganizeSummary,
) -> Result<()> {
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    for name in files {
        let source = source_dir.join(name);
        let dest = dest_dir.join(name);
        if source.is_file() {
            if move_files {
                move_file(&source, &dest)?;
            } else {
                fs::copy(&source, &dest).with_context(|| {
                    format!("Failed to copy {} to {}", source.display(), dest.display())
                })?;
            }
            summary.transferred += 1;
        } else {
            pb.suspend(|| log::warn!("File not found: {}", source.display()));
            summary.missing += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(())
}
