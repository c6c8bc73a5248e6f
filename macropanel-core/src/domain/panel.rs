//! Wide date-indexed tables.
//!
//! `RawSnapshot` is a source's table as fetched: text dates, sparse rows.
//! `Panel` is the typed form used from curation onwards: a `NaiveDate` index
//! plus uniquely named `f64` columns, `NaN` meaning missing. Curated, master
//! and indicator panels all satisfy `Panel::validate_daily`.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use super::series::Series;

/// Structural problems with a panel. Raised by the curator and assembler;
/// malformed panels are never published.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("column '{column}' has {actual} rows, index has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("dates not strictly increasing: {prev} followed by {next}")]
    NonMonotonicDates { prev: NaiveDate, next: NaiveDate },

    #[error("daily index has a gap: {prev} followed by {next}")]
    NonContiguousIndex { prev: NaiveDate, next: NaiveDate },

    #[error("invalid column name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidColumnName(String),

    #[error("empty panel: {0}")]
    Empty(String),
}

/// One named column of a panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelColumn {
    pub name: String,
    pub values: Vec<f64>,
}

impl PanelColumn {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Index of the first finite value.
    pub fn first_valid(&self) -> Option<usize> {
        self.values.iter().position(|v| v.is_finite())
    }

    /// Index of the last finite value.
    pub fn last_valid(&self) -> Option<usize> {
        self.values.iter().rposition(|v| v.is_finite())
    }

    pub fn nan_fraction(&self) -> f64 {
        if self.values.is_empty() {
            return 1.0;
        }
        let missing = self.values.iter().filter(|v| !v.is_finite()).count();
        missing as f64 / self.values.len() as f64
    }
}

/// Date-indexed wide table of `f64` columns.
#[derive(Debug, Clone, Default)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    columns: Vec<PanelColumn>,
}

impl PartialEq for Panel {
    /// Cell-wise equality where two `NaN`s compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.dates == other.dates
            && self.columns.len() == other.columns.len()
            && self.columns.iter().zip(&other.columns).all(|(a, b)| {
                a.name == b.name
                    && a.values.len() == b.values.len()
                    && a
                        .values
                        .iter()
                        .zip(&b.values)
                        .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
            })
    }
}

impl Panel {
    /// Empty panel over the given index.
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    /// Empty panel over the contiguous daily range `[start, end]`.
    pub fn daily(start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(daily_range(start, end))
    }

    /// Build from parts, checking column lengths and name uniqueness.
    pub fn from_parts(
        dates: Vec<NaiveDate>,
        columns: Vec<PanelColumn>,
    ) -> Result<Self, SchemaError> {
        let mut panel = Self::new(dates);
        for column in columns {
            panel.push_column(column.name, column.values)?;
        }
        Ok(panel)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[PanelColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_entry(&self, name: &str) -> Option<&PanelColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.dates.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Append a column. Fails on a duplicate name or a length mismatch.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(SchemaError::DuplicateColumn(name));
        }
        if values.len() != self.dates.len() {
            return Err(SchemaError::LengthMismatch {
                column: name,
                expected: self.dates.len(),
                actual: values.len(),
            });
        }
        self.columns.push(PanelColumn { name, values });
        Ok(())
    }

    /// Row position of `date`.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn value_at(&self, column: &str, date: NaiveDate) -> Option<f64> {
        let row = self.position(date)?;
        self.column(column).map(|values| values[row])
    }

    /// Latest finite value of a column with its date.
    pub fn last_valid(&self, column: &str) -> Option<(NaiveDate, f64)> {
        let entry = self.column_entry(column)?;
        let row = entry.last_valid()?;
        Some((self.dates[row], entry.values[row]))
    }

    /// First `len` rows (all columns).
    pub fn truncated(&self, len: usize) -> Panel {
        let len = len.min(self.dates.len());
        Panel {
            dates: self.dates[..len].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| PanelColumn::new(c.name.clone(), c.values[..len].to_vec()))
                .collect(),
        }
    }

    /// Keep only the named columns (in the given order), skipping unknown names.
    pub fn select(&self, names: &[&str]) -> Panel {
        Panel {
            dates: self.dates.clone(),
            columns: names
                .iter()
                .filter_map(|n| self.column_entry(n).cloned())
                .collect(),
        }
    }

    /// Place this panel's values onto the contiguous daily index `[start, end]`.
    ///
    /// Dates outside the range are dropped; days with no row become `NaN`.
    /// Requires strictly increasing dates.
    pub fn reindex_daily(&self, start: NaiveDate, end: NaiveDate) -> Result<Panel, SchemaError> {
        self.check_strictly_increasing()?;
        let dates = daily_range(start, end);
        let mut columns: Vec<PanelColumn> = self
            .columns
            .iter()
            .map(|c| PanelColumn::new(c.name.clone(), vec![f64::NAN; dates.len()]))
            .collect();
        for (row, date) in self.dates.iter().enumerate() {
            if *date < start || *date > end {
                continue;
            }
            let target = (*date - start).num_days() as usize;
            for (out, src) in columns.iter_mut().zip(&self.columns) {
                out.values[target] = src.values[row];
            }
        }
        Ok(Panel { dates, columns })
    }

    /// Forward-fill every column independently. Never backfills.
    pub fn forward_filled(mut self) -> Panel {
        for column in &mut self.columns {
            forward_fill(&mut column.values);
        }
        self
    }

    /// Enforce the panel invariants: strictly increasing, gap-free daily
    /// index; unique column names; every column as long as the index.
    pub fn validate_daily(&self) -> Result<(), SchemaError> {
        self.check_strictly_increasing()?;
        for pair in self.dates.windows(2) {
            if pair[1] - pair[0] != Duration::days(1) {
                return Err(SchemaError::NonContiguousIndex {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
            if column.values.len() != self.dates.len() {
                return Err(SchemaError::LengthMismatch {
                    column: column.name.clone(),
                    expected: self.dates.len(),
                    actual: column.values.len(),
                });
            }
        }
        Ok(())
    }

    fn check_strictly_increasing(&self) -> Result<(), SchemaError> {
        for pair in self.dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SchemaError::NonMonotonicDates {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(())
    }
}

/// Propagate the last finite value across subsequent `NaN`s.
pub fn forward_fill(values: &mut [f64]) {
    let mut last: Option<f64> = None;
    for v in values.iter_mut() {
        if v.is_finite() {
            last = Some(*v);
        } else if let Some(prev) = last {
            *v = prev;
        } else {
            *v = f64::NAN;
        }
    }
}

/// Contiguous daily dates `[start, end]`; empty when `end < start`.
pub fn daily_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// A source's wide table as fetched. Dates stay textual until curation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    pub dates: Vec<String>,
    pub columns: Vec<PanelColumn>,
}

impl RawSnapshot {
    /// Wide table over the union of the series' dates; one column per
    /// series id, `NaN` where a series has no point.
    pub fn from_series(series: &[Series]) -> Self {
        let all_dates: BTreeSet<NaiveDate> = series
            .iter()
            .flat_map(|s| s.observations().iter().map(|o| o.date))
            .collect();
        let dates: Vec<NaiveDate> = all_dates.into_iter().collect();

        let columns = series
            .iter()
            .map(|s| {
                let mut values = vec![f64::NAN; dates.len()];
                for obs in s.observations() {
                    if let Ok(row) = dates.binary_search(&obs.date) {
                        values[row] = obs.value;
                    }
                }
                PanelColumn::new(s.id.clone(), values)
            })
            .collect();

        Self {
            dates: dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect(),
            columns,
        }
    }

    /// Textual view of a typed panel.
    pub fn from_panel(panel: &Panel) -> Self {
        Self {
            dates: panel
                .dates()
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect(),
            columns: panel.columns().to_vec(),
        }
    }

    pub fn height(&self) -> usize {
        self.dates.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Every column as long as the date column, names unique.
    pub fn validate_shape(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
            if column.values.len() != self.dates.len() {
                return Err(SchemaError::LengthMismatch {
                    column: column.name.clone(),
                    expected: self.dates.len(),
                    actual: column.values.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, SourceTag};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn forward_fill_never_backfills() {
        let mut v = vec![f64::NAN, 1.0, f64::NAN, f64::NAN, 2.0, f64::NAN];
        forward_fill(&mut v);
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[1.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn push_column_rejects_duplicates_and_bad_lengths() {
        let mut panel = Panel::daily(d("2024-01-01"), d("2024-01-03"));
        panel.push_column("A", vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(
            panel.push_column("A", vec![1.0, 2.0, 3.0]),
            Err(SchemaError::DuplicateColumn("A".into()))
        );
        assert!(matches!(
            panel.push_column("B", vec![1.0]),
            Err(SchemaError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn validate_daily_detects_gaps_and_disorder() {
        let gap = Panel::new(vec![d("2024-01-01"), d("2024-01-03")]);
        assert!(matches!(
            gap.validate_daily(),
            Err(SchemaError::NonContiguousIndex { .. })
        ));

        let disorder = Panel::new(vec![d("2024-01-02"), d("2024-01-01")]);
        assert!(matches!(
            disorder.validate_daily(),
            Err(SchemaError::NonMonotonicDates { .. })
        ));

        assert!(Panel::daily(d("2024-02-27"), d("2024-03-02"))
            .validate_daily()
            .is_ok());
    }

    #[test]
    fn reindex_daily_places_values_by_date() {
        let panel = Panel::from_parts(
            vec![d("2024-01-01"), d("2024-01-04")],
            vec![PanelColumn::new("A", vec![1.0, 4.0])],
        )
        .unwrap();
        let daily = panel.reindex_daily(d("2024-01-01"), d("2024-01-05")).unwrap();
        let a = daily.column("A").unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a[0], 1.0);
        assert!(a[1].is_nan() && a[2].is_nan());
        assert_eq!(a[3], 4.0);
        assert!(a[4].is_nan());
    }

    #[test]
    fn raw_snapshot_from_series_unions_dates() {
        let tag = SourceTag::new("fred").unwrap();
        let a = Series::new(
            "A",
            tag.clone(),
            None,
            vec![Observation::new(d("2024-01-01"), 1.0)],
        );
        let b = Series::new(
            "B",
            tag,
            None,
            vec![Observation::new(d("2024-01-02"), 2.0)],
        );
        let raw = RawSnapshot::from_series(&[a, b]);
        assert_eq!(raw.dates, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(raw.columns[0].values[0], 1.0);
        assert!(raw.columns[0].values[1].is_nan());
        assert!(raw.columns[1].values[0].is_nan());
        assert!(raw.validate_shape().is_ok());
    }

    #[test]
    fn nan_aware_equality() {
        let a = Panel::from_parts(
            vec![d("2024-01-01")],
            vec![PanelColumn::new("A", vec![f64::NAN])],
        )
        .unwrap();
        assert_eq!(a, a.clone());
    }

    #[test]
    fn last_valid_skips_trailing_nan() {
        let panel = Panel::from_parts(
            vec![d("2024-01-01"), d("2024-01-02")],
            vec![PanelColumn::new("A", vec![5.0, f64::NAN])],
        )
        .unwrap();
        assert_eq!(panel.last_valid("A"), Some((d("2024-01-01"), 5.0)));
    }
}
