//! Spreadsheet to line-delimited JSON.
//!
//! The first worksheet's first row is the header. Every following non-empty
//! row becomes one JSON object keyed by header, in column order, and the
//! whole batch is uploaded as a single text document.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::path::Path;
use vsctl_core::{AppError, AppResult};

/// Ordered row records parsed from one spreadsheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentBatch {
    columns: Vec<String>,
    records: Vec<Map<String, Value>>,
}

impl ContentBatch {
    /// Read the first worksheet of an xlsx/xls/xlsb/ods workbook.
    pub fn from_spreadsheet(path: &Path) -> AppResult<Self> {
        let mut workbook = open_workbook_auto(path).map_err(|e| {
            AppError::Spreadsheet(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| {
                AppError::Spreadsheet(format!("{} contains no worksheet", path.display()))
            })?
            .map_err(|e| {
                AppError::Spreadsheet(format!("Failed to read {}: {}", path.display(), e))
            })?;

        let mut rows = range.rows();
        let header = rows.next().unwrap_or_default();
        let body: Vec<&[Data]> = rows.collect();

        let batch = Self::from_rows(header, &body);
        tracing::info!(
            "Parsed {} rows x {} columns from {}",
            batch.len(),
            batch.columns.len(),
            path.display()
        );
        Ok(batch)
    }

    /// Build a batch from a header row and data rows.
    pub fn from_rows(header: &[Data], rows: &[&[Data]]) -> Self {
        let width = rows
            .iter()
            .map(|row| row.len())
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        let columns = column_names(header, width);

        let records = rows
            .iter()
            .filter(|row| row.iter().any(|cell| !is_blank(cell)))
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let value = row.get(i).map(cell_value).unwrap_or(Value::Null);
                        (column.clone(), value)
                    })
                    .collect()
            })
            .collect();

        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Map<String, Value>] {
        &self.records
    }

    /// One compact JSON object per line, with a trailing newline when non-empty.
    pub fn to_json_lines(&self) -> AppResult<String> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}

/// File name used for the uploaded payload of an index.
pub fn upload_file_name(index_name: Option<&str>, index_id: &str) -> String {
    let stem = index_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(index_id);
    format!("{}.txt", stem)
}

/// Header labels padded to `width`, made unique.
fn column_names(header: &[Data], width: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(width);

    for i in 0..width {
        let base = match header.get(i) {
            Some(cell) if !is_blank(cell) => header_label(cell),
            _ => format!("Unnamed: {}", i),
        };

        let mut name = base.clone();
        let mut suffix = 0;
        while !seen.insert(name.clone()) {
            suffix += 1;
            name = format!("{}.{}", base, suffix);
        }
        names.push(name);
    }

    names
}

fn header_label(cell: &Data) -> String {
    match cell_value(cell) {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Empty cells and zero-length strings. Whitespace is content.
fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.is_empty(),
        _ => false,
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::Number((*i).into()),
        Data::Float(f) => float_value(*f),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::DateTime(dt) => {
            if dt.is_duration() {
                return float_value(dt.as_f64());
            }
            match cell.as_datetime() {
                Some(naive) => Value::String(naive.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
                None => float_value(dt.as_f64()),
            }
        }
    }
}

fn float_value(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Value::Number((f as i64).into());
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
