//! FRED adapter: `series/observations` and `series` JSON endpoints.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::http::HttpClient;
use super::provider::{FetchBatch, FetchError, FetchRange, SeriesMeta, SeriesProvider};
use crate::domain::{Frequency, Observation, Series, SourceTag};

pub const FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<FredObservation>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    seriess: Vec<FredSeriesInfo>,
}

#[derive(Debug, Deserialize)]
struct FredSeriesInfo {
    frequency_short: Option<String>,
    units: Option<String>,
    last_updated: Option<String>,
}

pub struct FredProvider {
    source: SourceTag,
    api_key: String,
    base_url: String,
    http: HttpClient,
}

impl FredProvider {
    pub fn new(source: SourceTag, api_key: impl Into<String>, http: HttpClient) -> Self {
        Self {
            source,
            api_key: api_key.into(),
            base_url: FRED_BASE_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn base_query(&self, series_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("series_id", series_id.to_string()),
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
        ]
    }
}

/// `"."` and empty strings are FRED's missing-value markers.
fn parse_value(series_id: &str, raw: &str) -> Result<f64, FetchError> {
    let s = raw.trim();
    if s.is_empty() || s == "." {
        return Ok(f64::NAN);
    }
    s.parse::<f64>().map_err(|_| {
        FetchError::Permanent(format!("unparseable value '{raw}' in {series_id}"))
    })
}

fn parse_observations(series_id: &str, body: ObservationsResponse) -> Result<Vec<Observation>, FetchError> {
    body.observations
        .into_iter()
        .map(|obs| {
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|e| {
                FetchError::Permanent(format!("invalid date '{}' in {series_id}: {e}", obs.date))
            })?;
            Ok(Observation::new(date, parse_value(series_id, &obs.value)?))
        })
        .collect()
}

/// FRED stamps `last_updated` as `2024-01-05 07:51:02-06`.
fn parse_last_updated(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    let head = s.get(..19).unwrap_or(s);
    NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S").ok()
}

impl SeriesProvider for FredProvider {
    fn name(&self) -> &str {
        "fred"
    }

    fn fetch(&self, series_id: &str, range: &FetchRange) -> Result<Series, FetchError> {
        let mut query = self.base_query(series_id);
        query.push(("sort_order", "asc".to_string()));
        if let Some(start) = range.start {
            query.push(("observation_start", start.to_string()));
        }
        if let Some(end) = range.end {
            query.push(("observation_end", end.to_string()));
        }

        let url = format!("{}/series/observations", self.base_url);
        let body: ObservationsResponse = self.http.get_json(&url, &query, series_id)?;
        let observations = parse_observations(series_id, body)?;
        Ok(Series::new(series_id, self.source.clone(), None, observations))
    }

    fn fetch_many(&self, series_ids: &[&str], range: &FetchRange) -> FetchBatch {
        self.http.fetch_parallel(series_ids, |id| self.fetch(id, range))
    }

    fn describe(&self, series_id: &str) -> Result<SeriesMeta, FetchError> {
        let url = format!("{}/series", self.base_url);
        let body: SeriesResponse = self.http.get_json(&url, &self.base_query(series_id), series_id)?;
        let info = body
            .seriess
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::no_such_series(series_id))?;
        Ok(SeriesMeta {
            series_id: series_id.to_string(),
            frequency: info.frequency_short.as_deref().and_then(Frequency::from_short_code),
            units: info.units,
            last_updated: info.last_updated.as_deref().and_then(parse_last_updated),
        })
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
