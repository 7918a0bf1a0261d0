// Store timestamp canonicalization and instant parsing

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Converts a store-native timestamp value into canonical ISO-8601 text
///
/// Implementations must be total: anything they cannot interpret becomes `""`.
pub trait TimestampCanonicalizer {
    fn to_canonical(&self, value: Option<&Value>) -> String;
}

/// Canonicalizer for the timestamp shapes the local store and its clients produce
///
/// - strings pass through verbatim
/// - integers are epoch milliseconds
/// - objects carry `seconds` + `nanoseconds` (or `_seconds` + `_nanoseconds`)
///
/// Output uses millisecond precision with a `Z` suffix, e.g. `2024-01-01T00:00:00.000Z`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoCanonicalizer;

impl TimestampCanonicalizer for IsoCanonicalizer {
    fn to_canonical(&self, value: Option<&Value>) -> String {
        let instant = match value {
            None | Some(Value::Null) => return String::new(),
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .and_then(DateTime::from_timestamp_millis),
            Some(Value::Object(obj)) => {
                let seconds = obj.get("seconds").or_else(|| obj.get("_seconds")).and_then(Value::as_i64);
                let nanos = obj
                    .get("nanoseconds")
                    .or_else(|| obj.get("_nanoseconds"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                seconds.and_then(|secs| DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?))
            }
            Some(_) => None,
        };

        instant.map(format_canonical).unwrap_or_default()
    }
}

/// Format an instant the way the canonicalizer does
pub fn format_canonical(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a calendar date or timestamp into an instant
///
/// Accepts RFC 3339 timestamps, zone-less `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC)
/// and bare `YYYY-MM-DD` dates (midnight UTC). Returns `None` for empty or
/// unparseable input.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
