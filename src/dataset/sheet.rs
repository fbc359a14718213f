//! Minimal spreadsheet model: a header row plus typed data rows, read with
//! `calamine` and written with `rust_xlsxwriter`.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use std::fmt;
use std::path::Path;

/// Column holding the class label of a sample.
pub const CLASS_COLUMN: &str = "Class Name";
/// Column holding the file name of a sample.
pub const FILE_COLUMN: &str = "Full File Name";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    String(String),
    Int(i64),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::String(value) => value.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::String(value) => f.write_str(value),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Number(value) => write!(f, "{value}"),
            Cell::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(value) => Cell::String(value.clone()),
            Data::Int(value) => Cell::Int(*value),
            Data::Float(value) => Cell::Number(*value),
            Data::Bool(value) => Cell::Bool(*value),
            Data::DateTime(value) => Cell::Number(value.as_f64()),
            other => Cell::String(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

/// One worksheet: column names and the rows beneath them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Index of the column named `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Like [`Sheet::column`] but an error naming the sheet's columns.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| {
            anyhow::anyhow!(
                "column '{name}' not found; available columns: {}",
                self.headers.join(", ")
            )
        })
    }

    /// Rendered values of column `index`, one per row.
    pub fn values(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(index).map(Cell::to_string).unwrap_or_default())
            .collect()
    }

    /// Sheet with the same headers holding clones of the given rows.
    pub fn subset(&self, indices: &[usize]) -> Sheet {
        Sheet {
            headers: self.headers.clone(),
            rows: indices.iter().map(|&idx| self.rows[idx].clone()).collect(),
        }
    }

    /// Read the first worksheet; the first row is the header.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open spreadsheet {}", path.display()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow::anyhow!("{} has no worksheets", path.display()))?
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .map(|row| row.iter().map(Cell::from).collect::<Vec<_>>())
            .filter(|row: &Vec<Cell>| !row.iter().all(Cell::is_empty))
            .collect();
        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }
        for (row_idx, row) in self.rows.iter().enumerate() {
            let row_num = row_idx as u32 + 1;
            for (col, cell) in row.iter().enumerate() {
                let col = col as u16;
                match cell {
                    Cell::Empty => {}
                    Cell::String(value) => {
                        worksheet.write_string(row_num, col, value)?;
                    }
                    Cell::Int(value) => {
                        worksheet.write_number(row_num, col, *value as f64)?;
                    }
                    Cell::Number(value) => {
                        worksheet.write_number(row_num, col, *value)?;
                    }
                    Cell::Bool(value) => {
                        worksheet.write_boolean(row_num, col, *value)?;
                    }
                }
            }
        }
        workbook
            .save(path)
            .with_context(|| format!("Failed to write spreadsheet {}", path.display()))?;
        Ok(())
    }
}
