//! File-drop adapter for sources published as downloadable files (OFR
//! financial stress and funding monitors, manual exports).
//!
//! Upstream ids are `<relative path>:<column>`, resolved under the drop
//! directory. CSV and parquet files are supported.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use super::dates::parse_date;
use super::provider::{FetchBatch, FetchError, FetchRange, SeriesProvider};
use super::table;
use crate::domain::{Observation, RawSnapshot, Series, SourceTag};

pub struct FileDropProvider {
    source: SourceTag,
    root: PathBuf,
}

impl FileDropProvider {
    pub fn new(source: SourceTag, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
        }
    }

    fn load(&self, relative: &str) -> Result<RawSnapshot, FetchError> {
        let path = self.root.join(relative);
        let format = table::format_for(&path).ok_or_else(|| {
            FetchError::Permanent(format!("unsupported file type: {}", path.display()))
        })?;
        let bytes = fs::read(&path)
            .map_err(|e| FetchError::Permanent(format!("cannot read {}: {e}", path.display())))?;
        table::decode(&bytes, format, &path).map_err(|e| FetchError::Permanent(e.to_string()))
    }

    fn to_series(&self, series_id: &str, column: &str, table: &RawSnapshot, range: &FetchRange) -> Result<Series, FetchError> {
        let values = table
            .columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| &c.values)
            .ok_or_else(|| FetchError::no_such_series(series_id))?;

        let mut dropped = 0usize;
        let mut observations = Vec::with_capacity(values.len());
        for (raw_date, value) in table.dates.iter().zip(values) {
            match parse_date(raw_date) {
                Some(date) if range.contains(date) => observations.push(Observation::new(date, *value)),
                Some(_) => {}
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!(series_id, dropped, "file drop rows with unparseable dates skipped");
        }
        Ok(Series::new(series_id, self.source.clone(), None, observations))
    }
}

fn split_id(series_id: &str) -> Result<(&str, &str), FetchError> {
    match series_id.rsplit_once(':') {
        Some((path, column)) if !path.is_empty() && !column.is_empty() => Ok((path, column)),
        _ => Err(FetchError::Permanent(format!(
            "file drop id '{series_id}' is not of the form <path>:<column>"
        ))),
    }
}

impl SeriesProvider for FileDropProvider {
    fn name(&self) -> &str {
        "file_drop"
    }

    fn fetch(&self, series_id: &str, range: &FetchRange) -> Result<Series, FetchError> {
        let (path, column) = split_id(series_id)?;
        let table = self.load(path)?;
        self.to_series(series_id, column, &table, range)
    }

    /// Each file is read once however many of its columns are requested.
    fn fetch_many(&self, series_ids: &[&str], range: &FetchRange) -> FetchBatch {
        let mut files: BTreeMap<&str, Result<RawSnapshot, FetchError>> = BTreeMap::new();
        series_ids
            .iter()
            .map(|id| {
                let result = split_id(*id).and_then(|(path, column)| {
                    let table = files.entry(path).or_insert_with(|| self.load(path));
                    match table {
                        Ok(t) => self.to_series(id, column, t, range),
                        Err(e) => Err(e.clone()),
                    }
                });
                (id.to_string(), result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn provider(dir: &std::path::Path) -> FileDropProvider {
        FileDropProvider::new(SourceTag::new("ofr").unwrap(), dir)
    }

    #[test]
    fn reads_csv_column_with_flexible_dates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("fsi.csv"),
            "Date,OFR FSI,Credit\n01/03/2024,-1.2,0.4\n2024-01-02,-1.1,\nnot-a-date,9,9\n",
        )
        .unwrap();
        let s = provider(dir.path())
            .fetch("fsi.csv:OFR FSI", &FetchRange::all())
            .unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.first_date(), NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(s.observations()[1].value, -1.2);
    }

    #[test]
    fn missing_column_is_no_such_series() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "date,x\n2024-01-01,1\n").unwrap();
        let err = provider(dir.path())
            .fetch("a.csv:y", &FetchRange::all())
            .unwrap_err();
        assert!(matches!(err, FetchError::NoSuchSeries { .. }));
    }

    #[test]
    fn missing_file_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let err = provider(dir.path())
            .fetch("nope.csv:x", &FetchRange::all())
            .unwrap_err();
        assert!(matches!(err, FetchError::Permanent(_)));
    }

    #[test]
    fn fetch_many_shares_one_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.csv"), "date,a,b\n2024-01-01,1,2\n").unwrap();
        let batch = provider(dir.path()).fetch_many(&["m.csv:a", "m.csv:b", "m.csv:c"], &FetchRange::all());
        assert!(batch["m.csv:a"].is_ok());
        assert!(batch["m.csv:b"].is_ok());
        assert!(batch["m.csv:c"].is_err());
    }
}
