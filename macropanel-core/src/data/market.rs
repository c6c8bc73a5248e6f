//! Market-data adapter over a Yahoo-style v8 chart API.
//!
//! Delivers the adjusted close per trading day (falling back to the close),
//! dated in the exchange's local calendar. The API is unofficial and changes
//! shape without notice; malformed payloads are permanent errors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::http::HttpClient;
use super::provider::{FetchBatch, FetchError, FetchRange, SeriesProvider};
use crate::domain::{Frequency, Observation, Series, SourceTag};

pub const MARKET_BASE_URL: &str = "https://query2.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

pub struct MarketProvider {
    source: SourceTag,
    base_url: String,
    history_start: NaiveDate,
    http: HttpClient,
}

impl MarketProvider {
    pub fn new(source: SourceTag, http: HttpClient) -> Self {
        Self {
            source,
            base_url: MARKET_BASE_URL.to_string(),
            history_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_history_start(mut self, start: NaiveDate) -> Self {
        self.history_start = start;
        self
    }

    pub fn history_start(&self) -> NaiveDate {
        self.history_start
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.base_url, symbol.replace('^', "%5E"))
    }
}

fn day_bounds(range: &FetchRange, history_start: NaiveDate) -> (i64, i64) {
    let start = range.start.unwrap_or(history_start);
    let end = range.end.unwrap_or_else(|| Utc::now().date_naive());
    let start_ts = start.and_hms_opt(0, 0, 0).map_or(0, |dt| dt.and_utc().timestamp());
    let end_ts = end.and_hms_opt(23, 59, 59).map_or(0, |dt| dt.and_utc().timestamp());
    (start_ts, end_ts)
}

fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<Observation>, FetchError> {
    let result = match (resp.chart.result, resp.chart.error) {
        (Some(result), _) => result,
        (None, Some(err)) if err.code == "Not Found" => return Err(FetchError::no_such_series(symbol)),
        (None, Some(err)) => {
            return Err(FetchError::Permanent(format!("{}: {}", err.code, err.description)))
        }
        (None, None) => return Err(FetchError::Permanent("empty chart result with no error".into())),
    };
    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::no_such_series(symbol))?;

    let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = data.timestamp.unwrap_or_default();
    let closes = data
        .indicators
        .quote
        .into_iter()
        .next()
        .and_then(|q| q.close)
        .unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut observations = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let value = adj_closes
            .get(i)
            .copied()
            .flatten()
            .or_else(|| closes.get(i).copied().flatten());
        // null rows are holidays or halted sessions
        let Some(value) = value else { continue };
        let date = DateTime::from_timestamp(ts + offset, 0)
            .map(|dt| dt.naive_utc().date())
            .ok_or_else(|| FetchError::Permanent(format!("invalid timestamp {ts} for {symbol}")))?;
        observations.push(Observation::new(date, value));
    }
    Ok(observations)
}

impl SeriesProvider for MarketProvider {
    fn name(&self) -> &str {
        "market"
    }

    fn fetch(&self, series_id: &str, range: &FetchRange) -> Result<Series, FetchError> {
        let (period1, period2) = day_bounds(range, self.history_start);
        let query = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];
        let resp: ChartResponse = self.http.get_json(&self.chart_url(series_id), &query, series_id)?;
        let observations = parse_chart(series_id, resp)?;
        Ok(Series::new(series_id, self.source.clone(), Some(Frequency::Daily), observations)
            .clip(range.start, range.end))
    }

    fn fetch_many(&self, series_ids: &[&str], range: &FetchRange) -> FetchBatch {
        self.http.fetch_parallel(series_ids, |id| self.fetch(id, range))
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
