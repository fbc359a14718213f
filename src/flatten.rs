//! Pull encoded files out of `*.dac` directories into their parent.

use crate::naming::unique_destination;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Counts reported after a flatten pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlattenSummary {
    /// Empty directories removed.
    pub removed_empty: usize,
    /// Single-file directories replaced by their file.
    pub collapsed: usize,
    /// Files moved out of multi-file directories.
    pub moved: usize,
    /// Directories left behind because something remained inside.
    pub kept: usize,
}

/// Flatten every `*.dac` subdirectory of `target_dir`.
pub fn flatten_dac_dirs(target_dir: &Path) -> Result<FlattenSummary> {
    let mut summary = FlattenSummary::default();
    if !target_dir.is_dir() {
        log::error!("Target directory {} does not exist.", target_dir.display());
        return Ok(summary);
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(target_dir)
        .with_context(|| format!("Failed to list {}", target_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && file_name(path).ends_with(".dac"))
        .collect();
    dirs.sort();

    for dir in dirs {
        let entries = match visible_entries(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("{err:#}, skipping");
                summary.kept += 1;
                continue;
            }
        };
        match entries.as_slice() {
            [] => match fs::remove_dir(&dir) {
                Ok(()) => {
                    log::info!("Directory {} is empty, removed it", dir.display());
                    summary.removed_empty += 1;
                }
                Err(err) => {
                    // Only hidden files left inside.
                    log::warn!("Could not remove {}: {err}, keeping it", dir.display());
                    summary.kept += 1;
                }
            },
            [only] if only.is_file() => {
                match collapse(target_dir, &dir, only) {
                    Ok(()) => summary.collapsed += 1,
                    Err(err) => {
                        log::warn!("Could not flatten {}: {err:#}", dir.display());
                        summary.kept += 1;
                    }
                }
            }
            _ => {
                log::info!(
                    "Directory {} contains {} files, processing each file",
                    dir.display(),
                    entries.len()
                );
                let stem = dir
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                for entry in entries.iter().filter(|entry| entry.is_file()) {
                    let destination =
                        unique_destination(target_dir, &format!("{stem}--{}", file_name(entry)));
                    log::info!("Moving {} to {}", entry.display(), destination.display());
                    match move_file(entry, &destination) {
                        Ok(()) => summary.moved += 1,
                        Err(err) => log::warn!("{err:#}, leaving it in place"),
                    }
                }

                let remaining = fs::read_dir(&dir).map(|entries| entries.count()).unwrap_or(0);
                if remaining > 0 {
                    log::warn!(
                        "Directory {} still contains {remaining} items, not removing",
                        dir.display()
                    );
                    summary.kept += 1;
                } else if let Err(err) = fs::remove_dir(&dir) {
                    log::warn!("Could not remove {}: {err}", dir.display());
                    summary.kept += 1;
                } else {
                    log::info!("Removed now-empty directory {}", dir.display());
                }
            }
        }
    }
    Ok(summary)
}

/// Replace `dir` with its single `file`, keeping the directory's name when possible.
///
/// The file is parked under a temporary name first so the directory can be
/// removed before its name is reused.
fn collapse(parent: &Path, dir: &Path, file: &Path) -> Result<()> {
    let dir_name = file_name(dir);
    let staging = unique_destination(parent, &format!(".{dir_name}.flatten"));
    move_file(file, &staging)?;

    if let Err(err) = fs::remove_dir(dir) {
        log::warn!("Could not remove {}: {err}", dir.display());
    }
    let destination = unique_destination(parent, &dir_name);
    log::info!("Renaming {} to {}", file.display(), destination.display());
    move_file(&staging, &destination)
}

/// Rename, falling back to copy-and-delete across filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))?;
    Ok(())
}

/// Entries of `dir`, ignoring dotfiles, sorted by name.
fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| !file_name(path).starts_with('.'))
        .collect();
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
