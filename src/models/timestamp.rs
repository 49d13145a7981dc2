use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// `createdAt` arrives from the store in several shapes: a seconds-based
/// timestamp object, an ISO-like string, or a human-formatted display string
/// such as "March 26, 2025 at 6:41:41 PM UTC+5:30". All of them resolve to a
/// single comparable epoch value; unparsable or missing values sort as the
/// oldest possible post and never raise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CreatedAt {
    Seconds {
        seconds: f64,
        #[serde(default)]
        nanoseconds: f64,
    },
    Text(String),
    #[default]
    Missing,
}

impl CreatedAt {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        CreatedAt::Seconds {
            seconds: dt.timestamp() as f64,
            nanoseconds: dt.timestamp_subsec_nanos() as f64,
        }
    }

    /// Epoch seconds for ordering. `Missing` and unparsable text resolve to
    /// negative infinity so they sort older than any valid timestamp.
    pub fn epoch_seconds(&self) -> f64 {
        match self {
            CreatedAt::Seconds { seconds, nanoseconds } => seconds + nanoseconds / 1e9,
            CreatedAt::Text(text) => parse_text(text).unwrap_or_else(|| {
                warn!(value = %text, "unparsable createdAt, sorting as oldest");
                f64::NEG_INFINITY
            }),
            CreatedAt::Missing => f64::NEG_INFINITY,
        }
    }
}

fn parse_text(text: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis() as f64 / 1e3);
    }

    // "March 26, 2025 at 6:41:41 PM UTC+5:30" — the offset suffix is dropped,
    // matching how these strings have always been interpreted.
    let (date_part, rest) = text.split_once(" at ")?;
    let time_part = rest.split(" UTC").next()?;
    let dt = NaiveDateTime::parse_from_str(
        &format!("{date_part} {time_part}"),
        "%B %d, %Y %I:%M:%S %p",
    )
    .ok()?;
    Some(dt.and_utc().timestamp() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn seconds_object_resolves() {
        let ts = CreatedAt::Seconds {
            seconds: 1_700_000_000.0,
            nanoseconds: 500_000_000.0,
        };
        assert!((ts.epoch_seconds() - 1_700_000_000.5).abs() < 1e-6);
    }

    #[test]
    fn iso_string_resolves() {
        let ts = CreatedAt::Text("2025-03-26T18:41:41+05:30".to_string());
        let expected = Utc.with_ymd_and_hms(2025, 3, 26, 13, 11, 41).unwrap();
        assert!((ts.epoch_seconds() - expected.timestamp() as f64).abs() < 1e-6);
    }

    #[test]
    fn formatted_string_resolves_ignoring_offset() {
        let ts = CreatedAt::Text("March 26, 2025 at 6:41:41 PM UTC+5:30".to_string());
        let expected = Utc.with_ymd_and_hms(2025, 3, 26, 18, 41, 41).unwrap();
        assert!((ts.epoch_seconds() - expected.timestamp() as f64).abs() < 1e-6);
    }

    #[test]
    fn garbage_and_missing_sort_oldest() {
        assert_eq!(CreatedAt::Text("not a date".into()).epoch_seconds(), f64::NEG_INFINITY);
        assert_eq!(CreatedAt::Missing.epoch_seconds(), f64::NEG_INFINITY);

        let valid = CreatedAt::Seconds { seconds: 1.0, nanoseconds: 0.0 };
        assert!(CreatedAt::Missing.epoch_seconds() < valid.epoch_seconds());
    }

    #[test]
    fn deserializes_all_shapes() {
        let a: CreatedAt = serde_json::from_value(serde_json::json!({"seconds": 10.0})).unwrap();
        assert_eq!(a.epoch_seconds(), 10.0);

        let b: CreatedAt = serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap();
        assert!(b.epoch_seconds() > 0.0);

        let c: CreatedAt = serde_json::from_value(serde_json::Value::Null).unwrap();
        assert_eq!(c, CreatedAt::Missing);
    }
}
