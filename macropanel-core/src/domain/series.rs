//! Series: the atomic time-series entity delivered by provider adapters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ident::is_identifier;

/// Native sampling frequency of an upstream series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    /// Map FRED-style short codes (`D`, `W`, `BW`, `M`, `Q`, `SA`, `A`).
    ///
    /// Anything coarser than quarterly is reported as quarterly; the pipeline
    /// only distinguishes calendars down to that resolution.
    pub fn from_short_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "D" => Some(Self::Daily),
            "W" | "BW" => Some(Self::Weekly),
            "M" => Some(Self::Monthly),
            "Q" | "SA" | "A" => Some(Self::Quarterly),
            _ => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
        };
        f.write_str(s)
    }
}

/// Tag naming the upstream source a series came from (`fred`, `nyfed`, ...).
///
/// Tags end up in file names and as column suffixes, so they are restricted
/// to identifier characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceTag(String);

impl SourceTag {
    pub fn new(tag: impl Into<String>) -> Result<Self, InvalidSourceTag> {
        let tag = tag.into();
        if is_identifier(&tag) {
            Ok(Self(tag))
        } else {
            Err(InvalidSourceTag(tag))
        }
    }

    /// Tag from a literal known to be an identifier.
    pub(crate) fn from_static(tag: &'static str) -> Self {
        debug_assert!(is_identifier(tag), "invalid static source tag {tag}");
        Self(tag.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SourceTag {
    type Error = InvalidSourceTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceTag> for String {
    fn from(tag: SourceTag) -> Self {
        tag.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid source tag '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
pub struct InvalidSourceTag(pub String);

/// One `(date, value)` point. Missing values are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }

    pub fn missing(date: NaiveDate) -> Self {
        Self {
            date,
            value: f64::NAN,
        }
    }

    pub fn is_missing(&self) -> bool {
        !self.value.is_finite()
    }
}

/// An ordered, deduplicated set of observations for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub source: SourceTag,
    pub frequency: Option<Frequency>,
    observations: Vec<Observation>,
}

impl Series {
    /// Build a series, sorting by date and keeping the last observation for a
    /// repeated date. Non-finite values are normalised to `NaN`.
    pub fn new(
        id: impl Into<String>,
        source: SourceTag,
        frequency: Option<Frequency>,
        mut observations: Vec<Observation>,
    ) -> Self {
        // Stable sort keeps arrival order within a date, so `dedup` below can
        // retain the last arrival.
        observations.sort_by_key(|o| o.date);
        let mut deduped: Vec<Observation> = Vec::with_capacity(observations.len());
        for obs in observations {
            let obs = Observation {
                date: obs.date,
                value: if obs.value.is_finite() {
                    obs.value
                } else {
                    f64::NAN
                },
            };
            match deduped.last_mut() {
                Some(last) if last.date == obs.date => *last = obs,
                _ => deduped.push(obs),
            }
        }
        Self {
            id: id.into(),
            source,
            frequency,
            observations: deduped,
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of points carrying a finite value.
    pub fn observed_count(&self) -> usize {
        self.observations.iter().filter(|o| !o.is_missing()).count()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// Restrict to `[start, end]` (either bound optional).
    pub fn clip(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.observations.retain(|o| {
            start.map_or(true, |s| o.date >= s) && end.map_or(true, |e| o.date <= e)
        });
        self
    }

    /// Re-label the series, e.g. from an upstream id to a catalog logical name.
    pub fn renamed(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fred() -> SourceTag {
        SourceTag::new("fred").unwrap()
    }

    #[test]
    fn new_sorts_and_keeps_last_duplicate() {
        let series = Series::new(
            "UNRATE",
            fred(),
            Some(Frequency::Monthly),
            vec![
                Observation::new(d("2024-03-01"), 3.8),
                Observation::new(d("2024-01-01"), 3.7),
                Observation::new(d("2024-03-01"), 3.9),
            ],
        );
        let obs = series.observations();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].date, d("2024-01-01"));
        assert_eq!(obs[1].value, 3.9);
    }

    #[test]
    fn infinities_become_missing() {
        let series = Series::new(
            "X",
            fred(),
            None,
            vec![Observation::new(d("2024-01-01"), f64::INFINITY)],
        );
        assert!(series.observations()[0].is_missing());
        assert_eq!(series.observed_count(), 0);
    }

    #[test]
    fn clip_is_inclusive() {
        let series = Series::new(
            "X",
            fred(),
            None,
            (1..=5)
                .map(|i| Observation::new(d("2024-01-01") + chrono::Duration::days(i), i as f64))
                .collect(),
        )
        .clip(Some(d("2024-01-03")), Some(d("2024-01-05")));
        assert_eq!(series.len(), 3);
        assert_eq!(series.first_date(), Some(d("2024-01-03")));
    }

    #[test]
    fn source_tag_rejects_non_identifiers() {
        assert!(SourceTag::new("ny fed").is_err());
        assert!(SourceTag::new("1fred").is_err());
        assert!(SourceTag::new("ofr_fsi").is_ok());
    }

    #[test]
    fn frequency_short_codes() {
        assert_eq!(Frequency::from_short_code("m"), Some(Frequency::Monthly));
        assert_eq!(Frequency::from_short_code("BW"), Some(Frequency::Weekly));
        assert_eq!(Frequency::from_short_code("?"), None);
    }
}
