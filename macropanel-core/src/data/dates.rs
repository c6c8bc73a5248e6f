//! Lenient calendar-date parsing for upstream payloads and raw snapshots.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d", "%d-%b-%Y"];

/// Parse a calendar day from the formats upstream files actually use.
///
/// Timestamps (RFC 3339 or `YYYY-MM-DD HH:MM:SS`) are truncated to their date;
/// any offset is dropped rather than converted.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local().date());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn common_formats() {
        assert_eq!(parse_date("2024-02-29"), Some(d(2024, 2, 29)));
        assert_eq!(parse_date("2024/02/29"), Some(d(2024, 2, 29)));
        assert_eq!(parse_date("02/29/2024"), Some(d(2024, 2, 29)));
        assert_eq!(parse_date("20240229"), Some(d(2024, 2, 29)));
        assert_eq!(parse_date(" 2024-01-05 "), Some(d(2024, 1, 5)));
    }

    #[test]
    fn timestamps_truncate_to_local_date() {
        assert_eq!(parse_date("2024-01-05T23:30:00-05:00"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05 16:00:00"), Some(d(2024, 1, 5)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2024-02-30"), None);
    }
}
