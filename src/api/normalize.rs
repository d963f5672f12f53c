//! Translate raw vendor records into [`CallFields`].
//!
//! Vendor field names drift between releases, so every logical field has an
//! ordered alias list; the first alias holding a non-empty value wins.
//! Malformed durations become 0 and malformed timestamps become `None`;
//! nothing in here fails.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use super::types::VendorRecord;
use crate::config::BusinessTz;
use crate::models::{CallFields, Direction};

/// Logical call field → vendor keys, in priority order.
pub struct Aliases {
    pub vendor_id: &'static [&'static str],
    pub timestamp: &'static [&'static str],
    pub direction: &'static [&'static str],
    pub source: &'static [&'static str],
    pub destination: &'static [&'static str],
    pub external: &'static [&'static str],
    pub talk: &'static [&'static str],
    pub ring: &'static [&'static str],
    pub status: &'static [&'static str],
    pub play_url: &'static [&'static str],
    pub download_url: &'static [&'static str],
}

pub const ALIASES: Aliases = Aliases {
    vendor_id: &["id", "call_id", "uuid"],
    timestamp: &["date_time", "datetime", "time", "started_at"],
    direction: &["type", "direction"],
    source: &["src"],
    destination: &["dst"],
    external: &["external_number"],
    talk: &["talk_time", "conversation", "duration", "billsec"],
    ring: &["ring_time", "ringing", "wait_time"],
    status: &["status"],
    play_url: &[
        "recorded_file_url",
        "play_url",
        "listen_url",
        "record_url",
        "audio_url",
        "stream_url",
    ],
    download_url: &["download_url", "record_download_url", "file_url"],
};

/// Keys tried, in order, when a field's value is an object.
const NESTED_TEXT_KEYS: &[&str] = &["code", "key", "value", "name", "label", "status", "type", "url"];

/// Timestamp layouts tried after RFC 3339, all timezone-naive.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Render an arbitrary JSON value as text.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.first().map(as_text).unwrap_or_default(),
        Value::Object(map) => NESTED_TEXT_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .map(as_text)
            .find(|s| !s.is_empty())
            .unwrap_or_default(),
    }
}

/// First alias present with a non-empty text value.
pub fn first_present(record: &VendorRecord, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .map(|v| as_text(v).trim().to_string())
        .find(|s| !s.is_empty())
}

/// Parse `H:M:S`, `M:S` or a plain integer into seconds. Anything else,
/// including values that overflow, is 0.
pub fn parse_duration(text: &str) -> i64 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }

    let seconds = if text.contains(':') {
        parse_clock(text)
    } else {
        text.parse::<i64>().ok()
    };
    seconds.unwrap_or(0).max(0)
}

fn parse_clock(text: &str) -> Option<i64> {
    let parts = text
        .split(':')
        .map(|p| p.trim().parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (h, m, s) = match parts.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    h.checked_mul(3600)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(s)
}

/// Parse a vendor timestamp into UTC.
///
/// Offset-carrying strings (`Z` or `±HH:MM`) are converted directly; naive
/// strings are read as wall time in `tz`. Returns `None` when every layout
/// fails.
pub fn parse_timestamp(text: &str, tz: BusinessTz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    parse_with_offset(text).or_else(|| parse_naive(text, tz))
}

fn parse_with_offset(text: &str) -> Option<DateTime<Utc>> {
    let normalized = text.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%:z"))
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%:z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(text: &str, tz: BusinessTz) -> Option<DateTime<Utc>> {
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .and_then(|naive| tz.localize(&naive))
}

/// Normalize one vendor record. `tz` is the business timezone assumed for
/// naive timestamps.
pub fn normalize_record(record: &VendorRecord, tz: BusinessTz) -> CallFields {
    let text = |keys: &[&str]| first_present(record, keys).unwrap_or_default();

    CallFields {
        vendor_id: first_present(record, ALIASES.vendor_id),
        timestamp: first_present(record, ALIASES.timestamp).and_then(|t| parse_timestamp(&t, tz)),
        direction: Direction::from_vendor(&text(ALIASES.direction)),
        source_number: text(ALIASES.source),
        destination_number: text(ALIASES.destination),
        external_number: text(ALIASES.external),
        talk_seconds: parse_duration(&text(ALIASES.talk)),
        ring_seconds: parse_duration(&text(ALIASES.ring)),
        status: text(ALIASES.status),
        play_url: text(ALIASES.play_url),
        download_url: text(ALIASES.download_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tashkent() -> BusinessTz {
        BusinessTz::parse("Asia/Tashkent").unwrap()
    }

    fn record(value: Value) -> VendorRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1:30"), 90);
        assert_eq!(parse_duration("01:02:03"), 3723);
        assert_eq!(parse_duration("45"), 45);
        assert_eq!(parse_duration(" 45 "), 45);
        assert_eq!(parse_duration(""), 0);
        assert_eq!(parse_duration("abc"), 0);
        assert_eq!(parse_duration("1:2:3:4"), 0);
        assert_eq!(parse_duration("1:xx"), 0);
        assert_eq!(parse_duration("12.5"), 0);
        assert_eq!(parse_duration("-7"), 0);
        assert_eq!(parse_duration("999999999999999999:0"), 0);
        assert_eq!(parse_duration("9999999999999999:0:0"), 0);
        assert_eq!(parse_duration("0:9223372036854775807"), 9223372036854775807);
        assert_eq!(parse_duration("1:9223372036854775807"), 0);
        assert_eq!(parse_duration("99999999999999999999"), 0);
    }

    #[test]
    fn test_parse_timestamp_naive_follows_dst() {
        let berlin = BusinessTz::parse("Europe/Berlin").unwrap();
        let winter = parse_timestamp("2025-01-15 14:00:00", berlin).unwrap();
        let summer = parse_timestamp("2025-07-15 14:00:00", berlin).unwrap();
        assert_eq!(winter.to_rfc3339(), "2025-01-15T13:00:00+00:00");
        assert_eq!(summer.to_rfc3339(), "2025-07-15T12:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_naive_uses_business_tz() {
        let ts = parse_timestamp("2025-06-10 14:00:00", tashkent()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-06-10T09:00:00+00:00");

        let ts = parse_timestamp("2025-06-10T14:00:00", tashkent()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-06-10T09:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let ts = parse_timestamp("2025-06-10T14:00:00Z", tashkent()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-06-10T14:00:00+00:00");

        let ts = parse_timestamp("2025-06-10T14:00:00+03:00", tashkent()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-06-10T11:00:00+00:00");

        let ts = parse_timestamp("2025-06-10 14:00:00+03:00", tashkent()).unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-06-10T11:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_failures() {
        assert!(parse_timestamp("", tashkent()).is_none());
        assert!(parse_timestamp("yesterday", tashkent()).is_none());
        assert!(parse_timestamp("2025-13-40 99:00:00", tashkent()).is_none());
    }

    #[test]
    fn test_as_text() {
        assert_eq!(as_text(&json!(null)), "");
        assert_eq!(as_text(&json!(42)), "42");
        assert_eq!(as_text(&json!({"label": "Incoming", "name": ""})), "Incoming");
        assert_eq!(as_text(&json!({"name": "x", "code": "in"})), "in");
        assert_eq!(as_text(&json!(["out", "in"])), "out");
        assert_eq!(as_text(&json!([])), "");
        assert_eq!(as_text(&json!({"other": 1})), "");
    }

    #[test]
    fn test_first_present_skips_empty() {
        let rec = record(json!({"talk_time": "", "conversation": null, "duration": "0:42"}));
        assert_eq!(first_present(&rec, ALIASES.talk).as_deref(), Some("0:42"));
        assert_eq!(first_present(&rec, ALIASES.ring), None);
    }

    #[test]
    fn test_normalize_record_full() {
        let rec = record(json!({
            "id": 987,
            "date_time": "2025-06-10 14:00:00",
            "type": {"code": "incoming"},
            "src": "+998 90 123 45 67",
            "dst": "101",
            "external_number": "998339993099",
            "conversation": "2:05",
            "ringing": 7,
            "status": {"label": "ANSWERED"},
            "listen_url": "https://rec.example/987.mp3"
        }));

        let fields = normalize_record(&rec, tashkent());
        assert_eq!(fields.vendor_id.as_deref(), Some("987"));
        assert_eq!(
            fields.timestamp.map(|t| t.to_rfc3339()).as_deref(),
            Some("2025-06-10T09:00:00+00:00")
        );
        assert_eq!(fields.direction, Direction::In);
        assert_eq!(fields.source_number, "+998 90 123 45 67");
        assert_eq!(fields.destination_number, "101");
        assert_eq!(fields.talk_seconds, 125);
        assert_eq!(fields.ring_seconds, 7);
        assert_eq!(fields.status, "ANSWERED");
        assert_eq!(fields.play_url, "https://rec.example/987.mp3");
        assert_eq!(fields.download_url, "");
        assert!(fields.has_recording());
    }

    #[test]
    fn test_normalize_record_sparse() {
        let rec = record(json!({"type": "weird", "duration": "n/a"}));
        let fields = normalize_record(&rec, tashkent());
        assert!(fields.vendor_id.is_none());
        assert!(fields.timestamp.is_none());
        assert_eq!(fields.direction, Direction::Other);
        assert_eq!(fields.talk_seconds, 0);
        assert!(!fields.has_recording());
    }
}
