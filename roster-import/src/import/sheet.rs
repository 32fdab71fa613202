//! Workbook reading and column normalization
//!
//! Sheets arrive as raw string cells. The first row carries extended field
//! descriptions and is skipped; the second defines the columns (only the
//! first line of each cell is the label) and is normalized into the names
//! the pipelines match on.

use std::path::Path;

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, Xlsx, open_workbook};

/// One sheet's name and raw cell values
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Convert an Excel cell to its string form, dates included
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

/// Read every sheet of an Excel workbook into raw string rows
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Vec<RawSheet>> {
    let path = path.as_ref();
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("failed to open workbook: {}", path.display()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();

    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("failed to read sheet: {}", name))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        sheets.push(RawSheet { name, rows });
    }

    Ok(sheets)
}

/// Normalize a column-definition row into matchable column names
///
/// Takes the first line of each cell, lowercases it, and replaces every
/// non-alphanumeric character with `_`. Fails when the row yields no usable
/// names at all, which aborts the sheet import.
pub fn normalize_columns(cells: &[String]) -> Result<Vec<String>> {
    let names: Vec<String> = cells
        .iter()
        .map(|cell| {
            cell.lines()
                .next()
                .unwrap_or("")
                .trim()
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_lowercase()
                    } else {
                        '_'
                    }
                })
                .collect()
        })
        .collect();

    if names.iter().all(|name: &String| name.is_empty()) {
        bail!("column definition row has no usable labels");
    }
    Ok(names)
}
