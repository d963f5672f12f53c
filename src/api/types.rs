use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::config::BusinessTz;
use serde::Deserialize;
use serde_json::{Map, Value};

/// A raw vendor call-history entry. Field names vary between vendor
/// releases, so records are kept untyped until `normalize` runs.
pub type VendorRecord = Map<String, Value>;

// ============================================================================
// Call History Response
// ============================================================================

/// Response from `GET /api/v1/call-history`
#[derive(Debug, Deserialize, Default)]
pub struct CallHistoryPage {
    #[serde(default, deserialize_with = "deserialize_records")]
    pub data: Vec<VendorRecord>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct PageMeta {
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub last_page: Option<u64>,
}

impl PageMeta {
    /// True when the vendor says no pages remain after this one.
    pub fn is_last(&self) -> bool {
        matches!((self.current_page, self.last_page), (Some(c), Some(l)) if c >= l)
    }
}

/// Accept `null` or a list; drop list entries that aren't objects.
fn deserialize_records<'de, D>(deserializer: D) -> Result<Vec<VendorRecord>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

// ============================================================================
// Sync Window
// ============================================================================

/// Vendor filter format for window bounds (business-local wall time).
const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The `[from, to]` range a sync asks the vendor for. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncWindow {
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
}

impl SyncWindow {
    /// `[now - days, now]` expressed in the business timezone. `None` when
    /// the start falls outside chrono's date range.
    pub fn lookback(now: DateTime<Utc>, days: u32, tz: BusinessTz) -> Option<Self> {
        let start = now.checked_sub_signed(Duration::try_days(i64::from(days))?)?;
        Some(Self {
            from: tz.to_local(&start),
            to: tz.to_local(&now),
        })
    }

    pub fn from_param(&self) -> String {
        self.from.format(WINDOW_FORMAT).to_string()
    }

    pub fn to_param(&self) -> String {
        self.to.format(WINDOW_FORMAT).to_string()
    }
}

// ============================================================================
// Connection Test
// ============================================================================

/// Outcome of a `test-connection` request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionReport {
    pub status: u16,
    pub items: Option<usize>,
    pub current_page: Option<u64>,
    pub last_page: Option<u64>,
    /// Body preview when the response wasn't JSON
    pub preview: Option<String>,
}

impl ConnectionReport {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn summary(&self) -> String {
        let mut msg = format!("HTTP {}", self.status);
        if let Some(items) = self.items {
            msg.push_str(&format!(" • data items: {}", items));
        }
        if self.current_page.is_some() || self.last_page.is_some() {
            msg.push_str(&format!(
                " • page {}/{}",
                self.current_page.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
                self.last_page.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
            ));
        }
        if let Some(preview) = &self.preview {
            msg.push_str(&format!(" • Response: {}", preview));
        }
        msg
    }
}
