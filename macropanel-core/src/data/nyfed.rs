//! NY Fed markets API adapter.
//!
//! Upstream ids look like `rates/unsecured/effr:percentRate`: an endpoint
//! path and a field of its records. Each field is exposed as its own series;
//! an endpoint is downloaded once per `fetch_many` call no matter how many of
//! its fields are requested.

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::dates::parse_date;
use super::http::HttpClient;
use super::provider::{FetchBatch, FetchError, FetchRange, SeriesProvider};
use crate::domain::{Observation, Series, SourceTag};

pub const NYFED_BASE_URL: &str = "https://markets.newyorkfed.org/api";

/// Record keys that carry the observation date, in priority order.
const DATE_KEYS: &[&str] = &["effectiveDate", "operationDate", "asOfDate", "date"];

type Record = (NaiveDate, Map<String, Value>);

pub struct NyFedProvider {
    source: SourceTag,
    base_url: String,
    page_days: i64,
    history_start: NaiveDate,
    http: HttpClient,
}

impl NyFedProvider {
    pub fn new(source: SourceTag, http: HttpClient) -> Self {
        Self {
            source,
            base_url: NYFED_BASE_URL.to_string(),
            page_days: 365,
            history_start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or(NaiveDate::MIN),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Length of each date-window request.
    pub fn with_page_days(mut self, days: u32) -> Self {
        self.page_days = i64::from(days.max(1));
        self
    }

    /// Start of history when a fetch has no lower bound.
    pub fn with_history_start(mut self, start: NaiveDate) -> Self {
        self.history_start = start;
        self
    }

    pub fn history_start(&self) -> NaiveDate {
        self.history_start
    }

    /// Download every page of `endpoint` overlapping `range`.
    fn fetch_endpoint(&self, endpoint: &str, range: &FetchRange) -> Result<Vec<Record>, FetchError> {
        let start = range.start.unwrap_or(self.history_start);
        let end = range.end.unwrap_or_else(|| Utc::now().date_naive());
        let url = format!("{}/{}/search.json", self.base_url, endpoint.trim_matches('/'));

        let mut records = Vec::new();
        for (page_start, page_end) in windows(start, end, self.page_days) {
            if self.http.cancel_token().is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let query = [
                ("startDate", page_start.to_string()),
                ("endDate", page_end.to_string()),
            ];
            let body: Value = self.http.get_json(&url, &query, endpoint)?;
            let page = flatten(&body);
            debug!(endpoint, %page_start, %page_end, rows = page.len(), "nyfed page");
            records.extend(page);
        }
        Ok(records)
    }

    fn to_series(&self, series_id: &str, field: &str, records: &[Record], range: &FetchRange) -> Result<Series, FetchError> {
        if !records.iter().any(|(_, row)| row.contains_key(field)) {
            return Err(FetchError::no_such_series(series_id));
        }
        let observations = records
            .iter()
            .filter(|(date, _)| range.contains(*date))
            .map(|(date, row)| {
                let value = row.get(field).and_then(numeric).unwrap_or(f64::NAN);
                Observation::new(*date, value)
            })
            .collect();
        Ok(Series::new(series_id, self.source.clone(), None, observations))
    }
}

/// Split `<endpoint>:<field>` at the last colon.
fn split_id(series_id: &str) -> Result<(&str, &str), FetchError> {
    match series_id.rsplit_once(':') {
        Some((endpoint, field)) if !endpoint.is_empty() && !field.is_empty() => Ok((endpoint, field)),
        _ => Err(FetchError::Permanent(format!(
            "nyfed id '{series_id}' is not of the form <endpoint>:<field>"
        ))),
    }
}

/// Consecutive inclusive windows of at most `page_days` covering `[start, end]`.
fn windows(start: NaiveDate, end: NaiveDate, page_days: i64) -> Vec<(NaiveDate, NaiveDate)> {
    let mut out = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let page_end = (cursor + Duration::days(page_days - 1)).min(end);
        out.push((cursor, page_end));
        cursor = page_end + Duration::days(1);
    }
    out
}

/// Records of the first array of objects found in the payload (depth-first,
/// keys in map order), each keyed by its parsed date. Records without a
/// recognisable date are dropped.
fn flatten(body: &Value) -> Vec<Record> {
    first_object_array(body)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_object)
                .filter_map(|obj| row_date(obj).map(|d| (d, obj.clone())))
                .collect()
        })
        .unwrap_or_default()
}

fn first_object_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) if items.iter().any(Value::is_object) => Some(items),
        Value::Array(items) => items.iter().find_map(first_object_array),
        Value::Object(map) => map.values().find_map(first_object_array),
        _ => None,
    }
}

fn row_date(row: &Map<String, Value>) -> Option<NaiveDate> {
    DATE_KEYS
        .iter()
        .filter_map(|k| row.get(*k).and_then(Value::as_str))
        .find_map(parse_date)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

impl SeriesProvider for NyFedProvider {
    fn name(&self) -> &str {
        "nyfed"
    }

    fn fetch(&self, series_id: &str, range: &FetchRange) -> Result<Series, FetchError> {
        let (endpoint, field) = split_id(series_id)?;
        let records = self.fetch_endpoint(endpoint, range)?;
        self.to_series(series_id, field, &records, range)
    }

    fn fetch_many(&self, series_ids: &[&str], range: &FetchRange) -> FetchBatch {
        let endpoints: Vec<&str> = series_ids
            .iter()
            .filter_map(|id| split_id(id).ok().map(|(endpoint, _)| endpoint))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let downloaded = self.http.map_parallel(&endpoints, |endpoint| self.fetch_endpoint(endpoint, range));
        let by_endpoint: BTreeMap<&str, Result<Vec<Record>, FetchError>> =
            endpoints.iter().copied().zip(downloaded).collect();

        series_ids
            .iter()
            .map(|id| {
                let result = split_id(id).and_then(|(endpoint, field)| match by_endpoint.get(endpoint) {
                    Some(Ok(records)) => self.to_series(id, field, records, range),
                    Some(Err(e)) => Err(e.clone()),
                    None => Err(FetchError::no_such_series(id)),
                });
                (id.to_string(), result)
            })
            .collect()
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
