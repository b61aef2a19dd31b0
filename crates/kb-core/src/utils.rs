use chrono::{DateTime, Utc};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for stored records).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

/// Convert a Slack `ts` ("1700000000.000100") into an RFC3339 UTC timestamp.
pub fn slack_ts_to_rfc3339(ts: &str) -> Option<String> {
    let (secs, frac) = ts.trim().split_once('.').unwrap_or((ts.trim(), ""));
    let secs = secs.parse::<i64>().ok()?;
    let micros = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().take(6).collect();
        let padded = format!("{digits:0<6}");
        padded.parse::<u32>().ok()?
    };
    let dt = DateTime::<Utc>::from_timestamp(secs, micros * 1_000)?;
    Some(dt.to_rfc3339())
}

/// Slack `oldest` parameter: whole unix seconds.
pub fn unix_seconds(dt: DateTime<Utc>) -> String {
    dt.timestamp().to_string()
}

// ============== Text Helpers ==============

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn take_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Length in characters (not bytes).
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
