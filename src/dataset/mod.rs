//! Spreadsheet-driven dataset tooling: train/val splitting and file routing.

pub mod reorganize;
pub mod sheet;
pub mod split;

pub use reorganize::{reorganize, ReorganizeOptions, ReorganizeSummary};
pub use sheet::{Cell, Sheet};
pub use split::{create_train_val_split, split_indices, SplitOptions, SplitReport};
