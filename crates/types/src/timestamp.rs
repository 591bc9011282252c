//! Tolerant RFC3339 timestamp decoding.
//!
//! The backend emits RFC3339 timestamps, sometimes with fractional seconds
//! and sometimes without, and some older builds omit the UTC offset entirely.
//! Everything is normalized to `DateTime<Utc>` on decode.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an RFC3339 timestamp, tolerating missing fractional seconds and a
/// missing UTC offset (treated as UTC). Returns `None` when the value cannot
/// be interpreted as a timestamp at all.
pub fn parse_rfc3339_lenient(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Offset-less timestamps from older backends; assume UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}

/// Serde adapter for `Option<DateTime<Utc>>` fields carrying lenient RFC3339
/// strings. An absent or empty string decodes as `None`; a present but
/// malformed value is a decode error.
pub mod option_lenient {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(value) if value.trim().is_empty() => Ok(None),
            Some(value) => super::parse_rfc3339_lenient(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid RFC3339 timestamp: {value}"))),
        }
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_with_fractional_seconds() {
        let parsed = parse_rfc3339_lenient("2026-08-23T10:15:30.123456Z").expect("parse");
        assert_eq!(parsed.second(), 30);
        assert_eq!(parsed.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn parses_without_fractional_seconds() {
        let parsed = parse_rfc3339_lenient("2026-08-23T10:15:30Z").expect("parse");
        assert_eq!(parsed.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn normalizes_offsets_to_utc() {
        let parsed = parse_rfc3339_lenient("2026-08-23T12:15:30+02:00").expect("parse");
        assert_eq!(parsed.hour(), 10);
    }

    #[test]
    fn tolerates_missing_offset() {
        let parsed = parse_rfc3339_lenient("2026-08-23T10:15:30").expect("parse");
        assert_eq!(parsed.hour(), 10);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_rfc3339_lenient("not a timestamp").is_none());
        assert!(parse_rfc3339_lenient("").is_none());
    }
}
