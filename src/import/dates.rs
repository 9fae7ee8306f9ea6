//! Date parsing for imported rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{LedgerError, Result};

/// Formats tried in order when no explicit format matches.
const KNOWN_FORMATS: [&str; 10] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%b %d, %Y",
    "%d %b %Y",
    "%Y%m%d",
];

/// Parses a row date.
///
/// `explicit` is tried first, then the known formats in order, then
/// timestamp forms (RFC 3339, `YYYY-MM-DDTHH:MM:SS`, or any string that
/// starts with an ISO date). Ambiguous day/month strings resolve to the
/// first matching format, so `03/04/2024` is March 4th unless an explicit
/// format says otherwise.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidInput`] if nothing matches.
pub(crate) fn parse_date(raw: &str, explicit: Option<&str>) -> Result<NaiveDate> {
    let text = raw.trim();
    if let Some(format) = explicit
        && let Ok(date) = NaiveDate::parse_from_str(text, format)
    {
        return Ok(date);
    }
    KNOWN_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| last_resort(text))
        .ok_or_else(|| LedgerError::invalid(format!("unrecognized date '{raw}'")))
}

/// Timestamp forms accepted when no date format matches.
fn last_resort(text: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.date_naive())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
                .map(|ts| ts.date())
                .ok()
        })
        .or_else(|| {
            text.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}
