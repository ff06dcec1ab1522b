use serde_json::Value;
use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    Date, OffsetDateTime, PrimitiveDateTime, Time,
};
use usage_client::domain::SiteZone;

use super::RawRecord;

/// Keys an upstream record may carry its interval start under, in order.
pub const TIMESTAMP_KEYS: [&str; 5] = ["startTime", "nemTime", "date", "timestamp", "ts"];

const LOCAL_DATETIME: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
const LOCAL_DATETIME_NO_SECONDS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]");
const LOCAL_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("no timestamp field")]
    Missing,
    #[error("malformed timestamp '{0}'")]
    Malformed(String),
    #[error("local time '{0}' does not exist at the site")]
    Nonexistent(String),
}

/// Timestamp as it arrives from upstream, before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawTimestamp<'a> {
    Text(&'a str),
    Instant(OffsetDateTime),
}

impl<'a> RawTimestamp<'a> {
    /// Strings are parsed later; integral numbers are taken as Unix seconds.
    pub fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RawTimestamp::Text(s)),
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                .map(RawTimestamp::Instant),
            _ => None,
        }
    }
}

/// Resolves `raw` to an instant expressed in the site's offset.
///
/// The instant is kept exactly as reported and is not snapped to a
/// half-hour boundary. Usage and price records join on this value, so they
/// only line up when both feeds stamp an interval the same way (the
/// retailer uses `hh:mm:01` for both).
pub fn normalize(raw: Option<RawTimestamp<'_>>, zone: SiteZone) -> Result<OffsetDateTime, TimestampError> {
    match raw {
        None => Err(TimestampError::Missing),
        Some(RawTimestamp::Instant(ts)) => Ok(zone.localize(ts)),
        Some(RawTimestamp::Text(text)) => parse_text(text, zone),
    }
}

/// Finds the first usable timestamp key in `record` and normalizes it.
pub fn record_timestamp(record: &RawRecord, zone: SiteZone) -> Result<OffsetDateTime, TimestampError> {
    let raw = TIMESTAMP_KEYS
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null());

    match raw {
        None => Err(TimestampError::Missing),
        Some(value) => match RawTimestamp::from_value(value) {
            Some(ts) => normalize(Some(ts), zone),
            None => Err(TimestampError::Malformed(value.to_string())),
        },
    }
}

/// Midnight at the start of `date`, site-local.
pub fn local_midnight(date: Date, zone: SiteZone) -> Result<OffsetDateTime, TimestampError> {
    let local = PrimitiveDateTime::new(date, Time::MIDNIGHT);
    zone.from_local(local)
        .ok_or_else(|| TimestampError::Nonexistent(date.to_string()))
}

/// Site-local `[start 00:00, end+1 00:00)`, covering both dates in full.
pub fn local_day_range(
    start: Date,
    end: Date,
    zone: SiteZone,
) -> Result<(OffsetDateTime, OffsetDateTime), TimestampError> {
    if end < start {
        return Err(TimestampError::Malformed(format!("range {start}..{end} ends before it starts")));
    }
    let after = end
        .next_day()
        .ok_or_else(|| TimestampError::Malformed(end.to_string()))?;
    Ok((local_midnight(start, zone)?, local_midnight(after, zone)?))
}

pub fn parse_date(text: &str) -> Result<Date, TimestampError> {
    Date::parse(text.trim(), LOCAL_DATE).map_err(|_| TimestampError::Malformed(text.to_string()))
}

fn parse_text(text: &str, zone: SiteZone) -> Result<OffsetDateTime, TimestampError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Missing);
    }

    // Explicit offset for a trailing Z, and a T separator for "date time".
    let mut canonical = match trimmed.strip_suffix(|c: char| c == 'Z' || c == 'z') {
        Some(head) => format!("{head}+00:00"),
        None => trimmed.to_string(),
    };
    if canonical.len() > 10 && canonical.as_bytes()[10] == b' ' {
        canonical.replace_range(10..11, "T");
    }

    if let Ok(ts) = OffsetDateTime::parse(&canonical, &Rfc3339) {
        return Ok(zone.localize(ts));
    }

    // No offset: the upstream meant site wall-clock time.
    let local = PrimitiveDateTime::parse(&canonical, LOCAL_DATETIME)
        .or_else(|_| PrimitiveDateTime::parse(&canonical, LOCAL_DATETIME_NO_SECONDS))
        .or_else(|_| Date::parse(&canonical, LOCAL_DATE).map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT)))
        .map_err(|_| TimestampError::Malformed(text.to_string()))?;

    zone.from_local(local)
        .ok_or_else(|| TimestampError::Nonexistent(text.to_string()))
}
