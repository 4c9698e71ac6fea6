use calamine::{open_workbook_auto, Data, Reader, Sheets};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use crate::table::{Record, Table, Value};

#[derive(Debug, Error)]
pub enum LoadError {
    /// Bad path or missing sheet; fatal, there is nothing to process.
    #[error("source not found: {path:?}{}", .sheet.as_ref().map(|s| format!(" (sheet '{}')", s)).unwrap_or_default())]
    SourceNotFound {
        path: PathBuf,
        sheet: Option<String>,
    },
    #[error("failed to read workbook {path:?}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("sheet '{sheet}' has no header row")]
    EmptySheet { sheet: String },
}

/// Read one named sheet of a spreadsheet workbook into a table.
pub fn load(path: &Path, sheet: &str) -> Result<Table, LoadError> {
    let mut workbook = open(path)?;
    read_sheet(&mut workbook, path, sheet)
}

/// Load several sheets and concatenate them into one table. An empty sheet
/// list means every sheet in the workbook.
pub fn load_sheets(path: &Path, sheets: &[String]) -> Result<Table, LoadError> {
    let tables = load_sheet_tables(path, sheets)?;
    Ok(Table::concat(tables.into_iter().map(|(_, t)| t).collect()))
}

/// Load several sheets, keeping each sheet as its own `(name, table)` pair.
pub fn load_sheet_tables(
    path: &Path,
    sheets: &[String],
) -> Result<Vec<(String, Table)>, LoadError> {
    let start_time = Instant::now();
    let mut workbook = open(path)?;

    let names: Vec<String> = if sheets.is_empty() {
        workbook.sheet_names().to_vec()
    } else {
        sheets.to_vec()
    };

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let table = read_sheet(&mut workbook, path, &name)?;
        tables.push((name, table));
    }

    info!(
        action = "complete",
        component = "loader",
        path = ?path,
        sheet_count = tables.len(),
        record_count = tables.iter().map(|(_, t)| t.len()).sum::<usize>(),
        duration_ms = start_time.elapsed().as_millis(),
        "Workbook loaded"
    );

    Ok(tables)
}

fn open(path: &Path) -> Result<Sheets<BufReader<File>>, LoadError> {
    if !path.exists() {
        return Err(LoadError::SourceNotFound {
            path: path.to_path_buf(),
            sheet: None,
        });
    }
    open_workbook_auto(path).map_err(|source| LoadError::Workbook {
        path: path.to_path_buf(),
        source,
    })
}

fn read_sheet(
    workbook: &mut Sheets<BufReader<File>>,
    path: &Path,
    sheet: &str,
) -> Result<Table, LoadError> {
    let start_time = Instant::now();

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(LoadError::SourceNotFound {
            path: path.to_path_buf(),
            sheet: Some(sheet.to_string()),
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|source| LoadError::Workbook {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or_else(|| LoadError::EmptySheet {
        sheet: sheet.to_string(),
    })?;

    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let text = cell_value(cell).display().trim().to_string();
            if text.is_empty() {
                format!("column_{}", i + 1)
            } else {
                text
            }
        })
        .collect();

    let mut table = Table::new(headers.clone());
    for row in rows {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let mut record = Record::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            record.set(header, cell_value(cell));
        }
        table.push(record);
    }

    info!(
        action = "read",
        component = "loader",
        sheet = sheet,
        record_count = table.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "Sheet read"
    );

    Ok(table)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Empty,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(n) => Value::Number(*n),
        Data::Int(n) => Value::Number(*n as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => Value::Date(datetime),
            None => Value::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) => Value::Empty,
    }
}
