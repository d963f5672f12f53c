use chrono::{DateTime, Utc};

use crate::config::BusinessTz;

/// Output mode determines how results are formatted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Tty,
    Json,
}

/// Detect the appropriate output mode.
pub fn detect_output_mode(json_flag: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    OutputMode::Tty
}

/// Talk/ring time for display: `0s`, `45s`, `2m 5s`, `1h 0m 3s`.
pub fn format_seconds(secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_string();
    }
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// A stored UTC timestamp rendered in the display timezone.
pub fn format_when(ts: Option<&DateTime<Utc>>, tz: &BusinessTz) -> String {
    ts.map(|t| tz.to_local(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "(no time)".to_string())
}
