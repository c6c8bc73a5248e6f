//! Wide-table encoding for the store and for file drops.
//!
//! A table is a date column followed by `f64` value columns. Parquet goes
//! through polars, CSV through the `csv` crate. Missing values are written as
//! null (parquet) or an empty field (CSV) and read back as `NaN`.

use chrono::NaiveDate;
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

use super::store::{StorageError, StorageFormat};
use crate::domain::{Panel, PanelColumn, RawSnapshot};

const DATE_COLUMN: &str = "date";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn format_err(path: &Path, message: impl std::fmt::Display) -> StorageError {
    StorageError::Format {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Encode a typed panel.
pub fn encode_panel(panel: &Panel, format: StorageFormat, path: &Path) -> Result<Vec<u8>, StorageError> {
    match format {
        StorageFormat::Csv => encode_csv(&RawSnapshot::from_panel(panel), path),
        StorageFormat::Parquet => {
            let days: Vec<i32> = panel
                .dates()
                .iter()
                .map(|d| (*d - epoch()).num_days() as i32)
                .collect();
            let date_col = Column::new(DATE_COLUMN.into(), days)
                .cast(&DataType::Date)
                .map_err(|e| format_err(path, format!("date cast: {e}")))?;
            encode_parquet(date_col, panel.columns(), path)
        }
    }
}

/// Encode a raw snapshot; dates stay text.
pub fn encode_raw(raw: &RawSnapshot, format: StorageFormat, path: &Path) -> Result<Vec<u8>, StorageError> {
    match format {
        StorageFormat::Csv => encode_csv(raw, path),
        StorageFormat::Parquet => {
            let date_col = Column::new(DATE_COLUMN.into(), raw.dates.clone());
            encode_parquet(date_col, &raw.columns, path)
        }
    }
}

fn encode_parquet(date_col: Column, columns: &[PanelColumn], path: &Path) -> Result<Vec<u8>, StorageError> {
    let mut cols = Vec::with_capacity(columns.len() + 1);
    cols.push(date_col);
    for c in columns {
        let values: Vec<Option<f64>> = c
            .values
            .iter()
            .map(|v| if v.is_finite() { Some(*v) } else { None })
            .collect();
        cols.push(Column::new(c.name.as_str().into(), values));
    }
    let mut df = DataFrame::new(cols).map_err(|e| format_err(path, format!("dataframe creation: {e}")))?;

    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(&mut df)
        .map_err(|e| format_err(path, format!("write parquet: {e}")))?;
    Ok(buf)
}

fn encode_csv(raw: &RawSnapshot, path: &Path) -> Result<Vec<u8>, StorageError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let header = std::iter::once(DATE_COLUMN).chain(raw.column_names());
    writer
        .write_record(header)
        .map_err(|e| format_err(path, format!("csv header: {e}")))?;

    let mut record: Vec<String> = Vec::with_capacity(raw.columns.len() + 1);
    for (row, date) in raw.dates.iter().enumerate() {
        record.clear();
        record.push(date.clone());
        for c in &raw.columns {
            let v = c.values.get(row).copied().unwrap_or(f64::NAN);
            record.push(if v.is_finite() { v.to_string() } else { String::new() });
        }
        writer
            .write_record(&record)
            .map_err(|e| format_err(path, format!("csv row {row}: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| format_err(path, format!("csv flush: {e}")))
}

/// Infer a format from a file extension.
pub fn format_for(path: &Path) -> Option<StorageFormat> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "csv" => Some(StorageFormat::Csv),
        "parquet" | "pq" => Some(StorageFormat::Parquet),
        _ => None,
    }
}

/// Decode any wide table into textual-date form. The date column is located
/// case-insensitively; every other column is read as `f64`, with unparseable
/// cells as `NaN`.
pub fn decode(bytes: &[u8], format: StorageFormat, path: &Path) -> Result<RawSnapshot, StorageError> {
    match format {
        StorageFormat::Csv => decode_csv(bytes, path),
        StorageFormat::Parquet => decode_parquet(bytes, path),
    }
}

fn find_date_column<'a, I>(names: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .position(|n| n.trim().eq_ignore_ascii_case(DATE_COLUMN))
}

fn decode_csv(bytes: &[u8], path: &Path) -> Result<RawSnapshot, StorageError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format_err(path, format!("csv header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let date_idx = find_date_column(headers.iter().map(String::as_str))
        .ok_or_else(|| format_err(path, "no date column"))?;

    let mut dates = Vec::new();
    let mut columns: Vec<PanelColumn> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(_, name)| PanelColumn::new(name.clone(), Vec::new()))
        .collect();

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format_err(path, format!("csv row {row}: {e}")))?;
        dates.push(record.get(date_idx).unwrap_or("").trim().to_string());
        let values = (0..headers.len()).filter(|i| *i != date_idx);
        for (col, field_idx) in columns.iter_mut().zip(values) {
            let v = record
                .get(field_idx)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            col.values.push(v);
        }
    }
    Ok(RawSnapshot { dates, columns })
}

fn decode_parquet(bytes: &[u8], path: &Path) -> Result<RawSnapshot, StorageError> {
    let df = ParquetReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|e| format_err(path, format!("read parquet: {e}")))?;
    let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
    let date_idx = find_date_column(names.iter().map(String::as_str))
        .ok_or_else(|| format_err(path, "no date column"))?;

    let dates = decode_date_column(&df.get_columns()[date_idx], path)?;
    let mut columns = Vec::with_capacity(names.len().saturating_sub(1));
    for (i, name) in names.iter().enumerate() {
        if i == date_idx {
            continue;
        }
        let cast = df.get_columns()[i]
            .cast(&DataType::Float64)
            .map_err(|e| format_err(path, format!("column '{name}': {e}")))?;
        let ca = cast
            .f64()
            .map_err(|e| format_err(path, format!("column '{name}' type: {e}")))?;
        let values = (0..df.height()).map(|r| ca.get(r).unwrap_or(f64::NAN)).collect();
        columns.push(PanelColumn::new(name.clone(), values));
    }
    Ok(RawSnapshot { dates, columns })
}

fn decode_date_column(col: &Column, path: &Path) -> Result<Vec<String>, StorageError> {
    let n = col.len();
    match col.dtype() {
        DataType::String => {
            let ca = col
                .str()
                .map_err(|e| format_err(path, format!("date column: {e}")))?;
            Ok((0..n).map(|i| ca.get(i).unwrap_or("").to_string()).collect())
        }
        _ => {
            let as_date = col
                .cast(&DataType::Date)
                .map_err(|e| format_err(path, format!("date cast: {e}")))?;
            let ca = as_date
                .date()
                .map_err(|e| format_err(path, format!("date column type: {e}")))?;
            Ok((0..n)
                .map(|i| {
                    ca.get(i)
                        .map(|days| (epoch() + chrono::Duration::days(i64::from(days))).format(DATE_FORMAT).to_string())
                        .unwrap_or_default()
                })
                .collect())
        }
    }
}

/// Strictly typed panel from a decoded table written by `encode_panel`.
pub fn decode_panel(bytes: &[u8], format: StorageFormat, path: &Path) -> Result<Panel, StorageError> {
    let raw = decode(bytes, format, path)?;
    let dates = raw
        .dates
        .iter()
        .enumerate()
        .map(|(row, s)| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|e| format_err(path, format!("row {row}: bad date '{s}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Panel::from_parts(dates, raw.columns).map_err(|source| StorageError::Schema {
        path: path.to_path_buf(),
        source,
    })
}
