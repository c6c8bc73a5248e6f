//! BLS public data API v2 adapter.
//!
//! The API accepts up to 50 series per POST and a bounded span of years per
//! request (20 with a registration key, 10 without), so `fetch_many` batches
//! ids natively and splits long ranges into year windows.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::http::HttpClient;
use super::provider::{FetchBatch, FetchError, FetchRange, SeriesProvider};
use crate::domain::{Frequency, Observation, Series, SourceTag};

pub const BLS_BASE_URL: &str = "https://api.bls.gov/publicAPI/v2";

/// Series per request accepted by the API.
pub const BLS_BATCH_SIZE: usize = 50;

const DEFAULT_HISTORY_YEARS: i32 = 20;

#[derive(Debug, Serialize)]
struct Request<'a> {
    seriesid: &'a [&'a str],
    startyear: String,
    endyear: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    registrationkey: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    message: Vec<String>,
    #[serde(rename = "Results")]
    results: Option<Results>,
}

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(default)]
    series: Vec<BlsSeries>,
}

#[derive(Debug, Deserialize)]
struct BlsSeries {
    #[serde(rename = "seriesID")]
    series_id: String,
    #[serde(default)]
    data: Vec<BlsPoint>,
}

#[derive(Debug, Deserialize)]
struct BlsPoint {
    year: String,
    period: String,
    value: String,
}

#[derive(Debug, Default)]
struct BatchEntry {
    frequency: Option<Frequency>,
    observations: Vec<Observation>,
}

pub struct BlsProvider {
    source: SourceTag,
    api_key: Option<String>,
    base_url: String,
    http: HttpClient,
}

impl BlsProvider {
    pub fn new(source: SourceTag, api_key: Option<String>, http: HttpClient) -> Self {
        Self {
            source,
            api_key,
            base_url: BLS_BASE_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn max_years(&self) -> i32 {
        if self.api_key.is_some() {
            20
        } else {
            10
        }
    }

    /// One batch of at most 50 ids over every year window of the range.
    fn fetch_batch(&self, ids: &[&str], range: &FetchRange) -> Result<BTreeMap<String, BatchEntry>, FetchError> {
        let end_year = range.end.map_or_else(|| Utc::now().year(), |d| d.year());
        let start_year = range
            .start
            .map_or(end_year - DEFAULT_HISTORY_YEARS + 1, |d| d.year());
        let url = format!("{}/timeseries/data/", self.base_url);
        let label = ids.join(",");

        let mut out: BTreeMap<String, BatchEntry> = BTreeMap::new();
        for (from, to) in year_windows(start_year, end_year, self.max_years()) {
            let body = Request {
                seriesid: ids,
                startyear: from.to_string(),
                endyear: to.to_string(),
                registrationkey: self.api_key.as_deref(),
            };
            let resp: Response = self.http.post_json(&url, &body, &label)?;
            if resp.status != "REQUEST_SUCCEEDED" {
                let message = resp.message.join("; ");
                if message.to_ascii_lowercase().contains("threshold") {
                    return Err(FetchError::Permanent(format!("BLS quota exhausted: {message}")));
                }
                return Err(FetchError::Permanent(format!("BLS {}: {message}", resp.status)));
            }
            debug!(series = %label, from, to, "bls window");
            for series in resp.results.map(|r| r.series).unwrap_or_default() {
                let parsed = parse_points(&series.series_id, &series.data)?;
                let entry = out.entry(series.series_id).or_default();
                entry.frequency = entry.frequency.or(infer_frequency(&series.data));
                entry.observations.extend(parsed);
            }
        }
        Ok(out)
    }
}

/// Inclusive year windows of at most `span` years.
fn year_windows(start: i32, end: i32, span: i32) -> Vec<(i32, i32)> {
    let span = span.max(1);
    let mut out = Vec::new();
    let mut from = start;
    while from <= end {
        let to = (from + span - 1).min(end);
        out.push((from, to));
        from = to + 1;
    }
    out
}

/// `M01..M12` map to the first of the month, `Q01..Q04` to the first day of
/// the quarter. Annual averages (`M13`) and other periods yield `None`.
fn period_date(year: &str, period: &str) -> Option<NaiveDate> {
    let year: i32 = year.trim().parse().ok()?;
    let (kind, num) = period.split_at_checked(1)?;
    let num: u32 = num.parse().ok()?;
    let month = match kind {
        "M" if (1..=12).contains(&num) => num,
        "Q" if (1..=4).contains(&num) => (num - 1) * 3 + 1,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn parse_points(series_id: &str, points: &[BlsPoint]) -> Result<Vec<Observation>, FetchError> {
    let mut out = Vec::with_capacity(points.len());
    for p in points {
        let Some(date) = period_date(&p.year, &p.period) else {
            continue;
        };
        let raw = p.value.trim();
        let value = if raw == "-" || raw.is_empty() {
            f64::NAN
        } else {
            raw.replace(',', "").parse::<f64>().map_err(|_| {
                FetchError::Permanent(format!("unparseable value '{raw}' in {series_id}"))
            })?
        };
        out.push(Observation::new(date, value));
    }
    Ok(out)
}

fn infer_frequency(points: &[BlsPoint]) -> Option<Frequency> {
    let first = points.iter().find(|p| p.period != "M13")?;
    match first.period.chars().next()? {
        'M' => Some(Frequency::Monthly),
        'Q' => Some(Frequency::Quarterly),
        _ => None,
    }
}

impl SeriesProvider for BlsProvider {
    fn name(&self) -> &str {
        "bls"
    }

    fn fetch(&self, series_id: &str, range: &FetchRange) -> Result<Series, FetchError> {
        self.fetch_many(&[series_id], range)
            .remove(series_id)
            .unwrap_or_else(|| Err(FetchError::no_such_series(series_id)))
    }

    fn fetch_many(&self, series_ids: &[&str], range: &FetchRange) -> FetchBatch {
        let batches: Vec<&[&str]> = series_ids.chunks(BLS_BATCH_SIZE).collect();
        let fetched = self.http.map_parallel(&batches, |batch| self.fetch_batch(batch, range));

        let mut out = FetchBatch::new();
        for (batch, result) in batches.iter().zip(fetched) {
            match result {
                Ok(mut by_id) => {
                    for id in batch.iter() {
                        let series = match by_id.remove(*id) {
                            Some(entry) if !entry.observations.is_empty() => Ok(Series::new(
                                *id,
                                self.source.clone(),
                                entry.frequency,
                                entry.observations,
                            )
                            .clip(range.start, range.end)),
                            _ => Err(FetchError::no_such_series(id)),
                        };
                        out.insert(id.to_string(), series);
                    }
                }
                Err(e) => {
                    for id in batch.iter() {
                        out.insert(id.to_string(), Err(e.clone()));
                    }
                }
            }
        }
        out
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
