//! Timestamp parsing tolerant of the backend's mixed formats.
//!
//! The scanner backend emits RFC 3339 strings in some fields and naive
//! ISO 8601 strings (no UTC offset) in others. Naive values are assumed
//! to be UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use piiwatch_core::types::Timestamp;
use serde::{Deserialize, Deserializer};

/// Parse a timestamp in either RFC 3339 or naive ISO 8601 form.
pub fn parse_flexible(raw: &str) -> Option<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Serde adapter for optional flexible timestamps.
///
/// Unparseable or absent values deserialize to `None` rather than failing
/// the whole payload.
pub fn opt_flexible<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_flexible))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_flexible("2026-08-06T12:30:00+02:00").unwrap();
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn parses_naive_isoformat_as_utc() {
        // Shape produced by Python's datetime.isoformat().
        let ts = parse_flexible("2026-08-06T12:30:00.123456").unwrap();
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.minute(), 30);
    }

    #[test]
    fn parses_naive_isoformat_without_fraction() {
        assert!(parse_flexible("2026-08-06T12:30:00").is_some());
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse_flexible("not a timestamp").is_none());
        assert!(parse_flexible("").is_none());
    }

    #[test]
    fn serde_adapter_tolerates_null_and_garbage() {
        #[derive(serde::Deserialize)]
        struct Payload {
            #[serde(default, deserialize_with = "opt_flexible")]
            at: Option<Timestamp>,
        }

        let parsed: Payload = serde_json::from_str(r#"{"at": null}"#).unwrap();
        assert!(parsed.at.is_none());

        let parsed: Payload = serde_json::from_str(r#"{"at": "???"}"#).unwrap();
        assert!(parsed.at.is_none());

        let parsed: Payload = serde_json::from_str(r#"{"at": "2026-08-06T00:00:00Z"}"#).unwrap();
        assert!(parsed.at.is_some());
    }
}
