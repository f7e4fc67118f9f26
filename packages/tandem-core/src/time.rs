
use chrono::{DateTime, Utc};

/// Current Unix timestamp in seconds
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Current Unix timestamp in milliseconds
pub fn now_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render a millisecond timestamp as local-agnostic `HH:MM:SS` (UTC)
pub fn format_clock(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}
