//! Curation: a source's raw snapshot onto a contiguous daily calendar.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::dates::parse_date;
use crate::domain::{Panel, PanelColumn, RawSnapshot, SchemaError};

/// What curation dropped or omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurationReport {
    pub rows_in: usize,
    pub unparseable_dates: usize,
    pub duplicate_dates: usize,
    /// Columns with no observation at all.
    pub omitted_columns: Vec<String>,
    pub rows_out: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Reindex `raw` onto the contiguous daily range spanned by its observed
/// rows and forward-fill each column.
///
/// Unparseable dates are dropped, a repeated date keeps its last row.
/// Idempotent: curating the textual form of a curated panel returns it
/// unchanged.
pub fn curate(raw: &RawSnapshot) -> Result<(Panel, CurationReport), SchemaError> {
    raw.validate_shape()?;
    let mut report = CurationReport {
        rows_in: raw.height(),
        ..Default::default()
    };

    // date -> source row; later rows overwrite earlier ones
    let mut rows: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for (row, text) in raw.dates.iter().enumerate() {
        match parse_date(text) {
            Some(date) => {
                if rows.insert(date, row).is_some() {
                    report.duplicate_dates += 1;
                }
            }
            None => report.unparseable_dates += 1,
        }
    }
    if report.unparseable_dates > 0 {
        warn!(dropped = report.unparseable_dates, "rows with unparseable dates dropped");
    }

    let kept: Vec<&PanelColumn> = raw
        .columns
        .iter()
        .filter(|c| {
            let observed = rows.values().any(|&r| c.values[r].is_finite());
            if !observed {
                report.omitted_columns.push(c.name.clone());
            }
            observed
        })
        .collect();
    if !report.omitted_columns.is_empty() {
        warn!(columns = ?report.omitted_columns, "columns without observations omitted");
    }

    let observed_row = |row: usize| kept.iter().any(|c| c.values[row].is_finite());
    let start = rows.iter().find(|(_, r)| observed_row(**r)).map(|(d, _)| *d);
    let end = rows.iter().rev().find(|(_, r)| observed_row(**r)).map(|(d, _)| *d);
    let (Some(start), Some(end)) = (start, end) else {
        return Err(SchemaError::Empty("snapshot has no observations".into()));
    };

    let dates: Vec<NaiveDate> = rows.keys().copied().collect();
    let columns = kept
        .iter()
        .map(|c| {
            let values = rows.values().map(|&r| c.values[r]).collect();
            PanelColumn::new(c.name.clone(), values)
        })
        .collect();
    let panel = Panel::from_parts(dates, columns)?
        .reindex_daily(start, end)?
        .forward_filled();
    panel.validate_daily()?;

    report.rows_out = panel.height();
    report.start = Some(start);
    report.end = Some(end);
    debug!(rows = report.rows_out, columns = panel.width(), %start, %end, "curated");
    Ok((panel, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn raw(dates: &[&str], columns: Vec<(&str, Vec<f64>)>) -> RawSnapshot {
        RawSnapshot {
            dates: dates.iter().map(|s| s.to_string()).collect(),
            columns: columns
                .into_iter()
                .map(|(n, v)| PanelColumn::new(n, v))
                .collect(),
        }
    }

    #[test]
    fn monthly_series_becomes_daily() {
        let r = raw(
            &["2024-01-01", "2024-02-01", "2024-03-01"],
            vec![("UNRATE", vec![3.7, 3.9, 3.8])],
        );
        let (p, report) = curate(&r).unwrap();
        assert_eq!(p.start(), Some(d("2024-01-01")));
        assert_eq!(p.end(), Some(d("2024-03-01")));
        assert_eq!(p.height(), 61);
        assert_eq!(p.value_at("UNRATE", d("2024-01-15")), Some(3.7));
        assert_eq!(p.value_at("UNRATE", d("2024-02-29")), Some(3.9));
        assert_eq!(report.rows_out, 61);
    }

    #[test]
    fn duplicates_keep_last_and_unsorted_input() {
        let r = raw(
            &["2024-01-03", "2024-01-01", "2024-01-03"],
            vec![("A", vec![1.0, 0.0, 2.0])],
        );
        let (p, report) = curate(&r).unwrap();
        assert_eq!(report.duplicate_dates, 1);
        assert_eq!(p.column("A").unwrap(), &[0.0, 0.0, 2.0]);
    }

    #[test]
    fn unparseable_dates_are_counted() {
        let r = raw(&["2024-01-01", "n/a", "01/02/2024"], vec![("A", vec![1.0, 9.0, 2.0])]);
        let (p, report) = curate(&r).unwrap();
        assert_eq!(report.unparseable_dates, 1);
        assert_eq!(p.column("A").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn empty_column_omitted_and_bounds_from_observed_rows() {
        let r = raw(
            &["2023-12-30", "2024-01-01", "2024-01-03", "2024-01-05"],
            vec![
                ("A", vec![f64::NAN, 1.0, f64::NAN, 3.0]),
                ("B", vec![f64::NAN; 4]),
            ],
        );
        let (p, report) = curate(&r).unwrap();
        assert_eq!(report.omitted_columns, vec!["B".to_string()]);
        assert_eq!(p.start(), Some(d("2024-01-01")));
        assert_eq!(p.column("A").unwrap(), &[1.0, 1.0, 1.0, 1.0, 3.0]);
    }

    #[test]
    fn later_starting_column_keeps_nan_prefix() {
        let r = raw(
            &["2024-01-01", "2024-01-03"],
            vec![("A", vec![1.0, 2.0]), ("B", vec![f64::NAN, 5.0])],
        );
        let (p, _) = curate(&r).unwrap();
        let b = p.column("B").unwrap();
        assert!(b[0].is_nan() && b[1].is_nan());
        assert_eq!(b[2], 5.0);
    }

    #[test]
    fn single_observation_is_one_row() {
        let r = raw(&["2024-05-01"], vec![("A", vec![4.0])]);
        let (p, _) = curate(&r).unwrap();
        assert_eq!(p.height(), 1);
        assert_eq!(p.column("A").unwrap(), &[4.0]);
    }

    #[test]
    fn no_observations_is_empty_error() {
        let r = raw(&["2024-01-01"], vec![("A", vec![f64::NAN])]);
        assert!(matches!(curate(&r), Err(SchemaError::Empty(_))));
    }

    #[test]
    fn curate_is_idempotent() {
        let r = raw(
            &["2024-01-01", "2024-01-10", "2024-02-01"],
            vec![("A", vec![1.0, f64::NAN, 3.0]), ("B", vec![f64::NAN, 2.0, f64::NAN])],
        );
        let (once, _) = curate(&r).unwrap();
        let (twice, _) = curate(&RawSnapshot::from_panel(&once)).unwrap();
        assert_eq!(once, twice);
    }
}
