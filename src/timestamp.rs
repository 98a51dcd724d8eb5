//! Serde helpers for timestamps in on-disk documents.
//!
//! Registry and auth documents carry timestamps as fractional epoch seconds;
//! the notebook library carries ISO-8601 strings. Both shapes match files
//! written by earlier single-account installs, which also wrote ISO strings
//! without an offset.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Convert epoch seconds to a UTC timestamp.
pub fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos).single()
}

/// Convert a UTC timestamp to epoch seconds.
pub fn to_epoch(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9
}

/// Required timestamp field.
pub mod epoch {
    use super::*;

    /// Serialize as epoch seconds.
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(to_epoch(ts))
    }

    /// Deserialize from epoch seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(d)?;
        from_epoch(secs).ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// Nullable timestamp field.
pub mod epoch_option {
    use super::*;

    /// Serialize as epoch seconds or null.
    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_some(&to_epoch(ts)),
            None => s.serialize_none(),
        }
    }

    /// Deserialize from epoch seconds or null.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<f64>::deserialize(d)? {
            Some(secs) => from_epoch(secs)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range")),
            None => Ok(None),
        }
    }
}

/// Parse RFC 3339, or a naive ISO-8601 string taken as UTC.
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Format as RFC 3339 with microseconds.
pub fn format_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Required ISO-8601 field.
pub mod iso {
    use super::*;

    /// Serialize as RFC 3339.
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_iso(ts))
    }

    /// Deserialize from RFC 3339 or naive ISO-8601.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        parse_iso(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s)))
    }
}

/// Nullable ISO-8601 field.
pub mod iso_option {
    use super::*;

    /// Serialize as RFC 3339 or null.
    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_some(&format_iso(ts)),
            None => s.serialize_none(),
        }
    }

    /// Deserialize from RFC 3339, naive ISO-8601 or null.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => parse_iso(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_conversion_keeps_fraction() {
        let ts = from_epoch(1_700_000_000.25).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!((to_epoch(&ts) - 1_700_000_000.25).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(from_epoch(f64::NAN).is_none());
        assert!(from_epoch(f64::INFINITY).is_none());
    }

    #[test]
    fn test_iso_accepts_naive_and_offset_forms() {
        let naive = parse_iso("2024-03-01T12:30:00.123456").unwrap();
        assert_eq!(naive.timestamp_subsec_micros(), 123_456);
        let offset = parse_iso("2024-03-01T13:30:00+01:00").unwrap();
        assert_eq!(offset.timestamp(), naive.timestamp());
        assert!(parse_iso("yesterday").is_none());
        assert_eq!(format_iso(&offset), "2024-03-01T12:30:00.000000Z");
    }
}
