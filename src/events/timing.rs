use chrono::{DateTime, NaiveDateTime};
use log::debug;
use serde_json::Value;

use super::EventType;
use crate::error::{RelayError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses a GitLab webhook timestamp (`2024-03-01 10:00:00 UTC` or
/// `2024-03-01 12:00:00 +0200`) into epoch milliseconds.
///
/// Newer GitLab versions send RFC 3339 timestamps, which are accepted too.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_str(value, &format!("{TIMESTAMP_FORMAT} %z")) {
        return Some(parsed.timestamp_millis());
    }

    if let Some((local, zone)) = value.rsplit_once(' ') {
        if matches!(zone, "UTC" | "GMT" | "Z") {
            if let Ok(naive) = NaiveDateTime::parse_from_str(local, TIMESTAMP_FORMAT) {
                return Some(naive.and_utc().timestamp_millis());
            }
        }
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.timestamp_millis())
}

/// The raw `*_at` fields of a notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timestamps<'a> {
    pub created_at: Option<&'a str>,
    pub started_at: Option<&'a str>,
    pub finished_at: Option<&'a str>,
}

/// Start time in epoch milliseconds: the explicit start, else
/// `finished - duration`, else the creation time.
pub fn start_time(timestamps: Timestamps<'_>, duration_seconds: Option<f64>) -> Option<i64> {
    let parse = |label: &str, value: Option<&str>| {
        let parsed = value.and_then(parse_timestamp);
        if parsed.is_none() {
            debug!("No usable '{label}' timestamp ({value:?})");
        }
        parsed
    };

    parse("started_at", timestamps.started_at)
        .or_else(|| {
            let finished = parse("finished_at", timestamps.finished_at)?;
            duration_seconds.map(|seconds| finished - to_millis(seconds))
        })
        .or_else(|| parse("created_at", timestamps.created_at))
}

/// Reads a raw duration in seconds. GitLab sends integers or decimals;
/// any other JSON representation is rejected.
pub fn duration_seconds(raw: Option<&Value>) -> Result<Option<f64>> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| RelayError::UnsupportedDuration(number.to_string())),
        Some(other) => Err(RelayError::UnsupportedDuration(other.to_string())),
    }
}

/// Duration in milliseconds as reported on the event. Started events always
/// report zero.
pub fn normalize_duration(event_type: EventType, duration_seconds: Option<f64>) -> i64 {
    match (event_type, duration_seconds) {
        (EventType::Started, _) | (_, None) => 0,
        (_, Some(seconds)) => to_millis(seconds),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_utc_timestamp() {
        assert_eq!(
            parse_timestamp("2024-03-01 10:00:00 UTC"),
            Some(1_709_287_200_000)
        );
    }

    #[test]
    fn test_parse_offset_timestamp() {
        assert_eq!(
            parse_timestamp("2024-03-01 12:00:00 +0200"),
            Some(1_709_287_200_000)
        );
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        assert_eq!(
            parse_timestamp("2024-03-01T10:00:00.000Z"),
            Some(1_709_287_200_000)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_start_time_prefers_started_at() {
        let timestamps = Timestamps {
            created_at: Some("2024-03-01 09:00:00 UTC"),
            started_at: Some("2024-03-01 10:00:00 UTC"),
            finished_at: Some("2024-03-01 11:00:00 UTC"),
        };
        assert_eq!(start_time(timestamps, Some(5.0)), Some(1_709_287_200_000));
    }

    #[test]
    fn test_start_time_from_finished_minus_duration() {
        let timestamps = Timestamps {
            created_at: Some("2024-03-01 09:00:00 UTC"),
            started_at: None,
            finished_at: Some("2024-03-01 10:00:10 UTC"),
        };
        assert_eq!(start_time(timestamps, Some(10.0)), Some(1_709_287_200_000));
    }

    #[test]
    fn test_start_time_falls_back_to_created_at() {
        let timestamps = Timestamps {
            created_at: Some("2024-03-01 10:00:00 UTC"),
            started_at: None,
            finished_at: Some("2024-03-01 10:00:10 UTC"),
        };
        assert_eq!(start_time(timestamps, None), Some(1_709_287_200_000));
        assert_eq!(start_time(Timestamps::default(), Some(1.0)), None);
    }

    #[test]
    fn test_duration_normalized_to_millis() {
        let seconds = duration_seconds(Some(&json!(12.5))).unwrap();
        assert_eq!(normalize_duration(EventType::Finished, seconds), 12_500);

        let seconds = duration_seconds(Some(&json!(3))).unwrap();
        assert_eq!(normalize_duration(EventType::Finished, seconds), 3_000);
    }

    #[test]
    fn test_started_duration_is_zero() {
        let seconds = duration_seconds(Some(&json!(12.5))).unwrap();
        assert_eq!(normalize_duration(EventType::Started, seconds), 0);
        assert_eq!(normalize_duration(EventType::Finished, None), 0);
    }

    #[test]
    fn test_unsupported_duration_representation() {
        let result = duration_seconds(Some(&json!("12.5")));
        assert!(matches!(result, Err(RelayError::UnsupportedDuration(_))));
    }
}
