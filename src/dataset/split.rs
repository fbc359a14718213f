//! Per-class train/validation split of a labelled spreadsheet.

use crate::dataset::sheet::{Sheet, CLASS_COLUMN};
use anyhow::Result;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use std::path::{Path, PathBuf};

pub const TRAIN_FILE: &str = "dac-train.xlsx";
pub const VAL_FILE: &str = "dac-val.xlsx";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    /// Rows drawn from every class that has enough of them.
    pub samples_per_class: usize,
    pub train_ratio: f64,
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            samples_per_class: 25,
            train_ratio: 0.8,
            seed: 42,
        }
    }
}

impl SplitOptions {
    fn validate(&self) -> Result<()> {
        if self.samples_per_class == 0 {
            anyhow::bail!("samples per class must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.train_ratio) {
            anyhow::bail!("train ratio must be within [0, 1], got {}", self.train_ratio);
        }
        Ok(())
    }

    /// Train rows for a full class; the rest of `samples_per_class` goes to validation.
    pub fn train_count(&self) -> usize {
        (self.samples_per_class as f64 * self.train_ratio).floor() as usize
    }
}

/// Row indices chosen for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSplit {
    pub class: String,
    pub available: usize,
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

/// Train/validation row indices for every class, in first-appearance order.
pub fn split_indices(sheet: &Sheet, options: &SplitOptions) -> Result<Vec<ClassSplit>> {
    options.validate()?;
    let class_col = sheet.require_column(CLASS_COLUMN)?;

    let mut classes: Vec<(String, Vec<usize>)> = Vec::new();
    for (row, label) in sheet.values(class_col).into_iter().enumerate() {
        if label.is_empty() {
            log::warn!("Row {} has no class label, skipping", row + 2);
            continue;
        }
        match classes.iter_mut().find(|(class, _)| *class == label) {
            Some((_, rows)) => rows.push(row),
            None => classes.push((label, vec![row])),
        }
    }

    let samples = options.samples_per_class;
    let mut splits = Vec::with_capacity(classes.len());
    for (class, rows) in classes {
        let available = rows.len();
        let (pool, train_count) = if available < samples {
            log::warn!(
                "Class {class} has only {available} samples, fewer than the requested {samples}"
            );
            let train = ((available as f64 * options.train_ratio).floor() as usize).max(1);
            (rows, train.min(available))
        } else {
            (draw(&rows, samples, options.seed), options.train_count())
        };

        let train = draw(&pool, train_count, options.seed);
        let val = pool.iter().copied().filter(|row| !train.contains(row)).collect();
        splits.push(ClassSplit {
            class,
            available,
            train,
            val,
        });
    }
    Ok(splits)
}

/// `amount` items of `items` without replacement, from a generator seeded afresh.
fn draw(items: &[usize], amount: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    index::sample(&mut rng, items.len(), amount)
        .into_iter()
        .map(|idx| items[idx])
        .collect()
}

/// Written spreadsheets and per-class counts of a split run.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitReport {
    pub train_path: PathBuf,
    pub val_path: PathBuf,
    pub train_rows: usize,
    pub val_rows: usize,
    pub classes: Vec<ClassSplit>,
}

/// Split `input` and write `dac-train.xlsx` / `dac-val.xlsx` into `output_dir`
/// (default: the input's directory).
pub fn create_train_val_split(
    input: &Path,
    output_dir: Option<&Path>,
    options: &SplitOptions,
) -> Result<SplitReport> {
    options.validate()?;
    let sheet = Sheet::read(input)?;
    let train_count = options.train_count();
    log::info!(
        "For each class: {train_count} samples for training, {} samples for validation",
        options.samples_per_class - train_count
    );

    let classes = split_indices(&sheet, options)?;
    let train_rows: Vec<usize> = classes.iter().flat_map(|c| c.train.iter().copied()).collect();
    let val_rows: Vec<usize> = classes.iter().flat_map(|c| c.val.iter().copied()).collect();

    let output_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    };
    std::fs::create_dir_all(&output_dir)?;
    let train_path = output_dir.join(TRAIN_FILE);
    let val_path = output_dir.join(VAL_FILE);
    sheet.subset(&train_rows).write(&train_path)?;
    sheet.subset(&val_rows).write(&val_path)?;

    log::info!(
        "Created training set with {} samples at {}",
        train_rows.len(),
        train_path.display()
    );
    log::info!(
        "Created validation set with {} samples at {}",
        val_rows.len(),
        val_path.display()
    );
    log::info!("Class distribution:");
    for split in &classes {
        let total = split.train.len() + split.val.len();
        if total == 0 {
            log::info!("Class {}: No samples", split.class);
            continue;
        }
        log::info!(
            "Class {}: {} train ({:.1}%), {} val ({:.1}%)",
            split.class,
            split.train.len(),
            100.0 * split.train.len() as f64 / total as f64,
            split.val.len(),
            100.0 * split.val.len() as f64 / total as f64
        );
    }

    Ok(SplitReport {
        train_path,
        val_path,
        train_rows: train_rows.len(),
        val_rows: val_rows.len(),
        classes,
    })
}
