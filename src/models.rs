//! Domain types for callsync.
//!
//! Vendor payloads are loosely shaped and are normalized into [`CallFields`]
//! by `api::normalize`; everything read back from the database is a
//! [`CallRecord`], [`Contact`] or [`User`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage and fingerprint format for timestamps (always UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_stored_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Call Types
// ============================================================================

/// Call direction as stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Missed,
    #[default]
    Other,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Missed => "missed",
            Direction::Other => "other",
        }
    }

    /// Map free-form vendor text through the synonym table.
    /// Unknown values become [`Direction::Other`].
    pub fn from_vendor(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "in" | "incoming" | "inbound" => Direction::In,
            "out" | "outgoing" | "outbound" => Direction::Out,
            "missed" | "miss" | "noanswer" | "no answer" | "not answered" => Direction::Missed,
            _ => Direction::Other,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "missed" => Ok(Direction::Missed),
            "other" => Ok(Direction::Other),
            _ => Err(format!(
                "invalid direction '{}': expected in, out, missed or other",
                s
            )),
        }
    }
}

/// Normalized call fields, as produced from a vendor record.
///
/// This is the candidate shape handed to the upsert engine; derived values
/// (digit forms, fingerprint, `has_recording`) are computed from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallFields {
    pub vendor_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub direction: Direction,
    pub source_number: String,
    pub destination_number: String,
    pub external_number: String,
    pub talk_seconds: i64,
    pub ring_seconds: i64,
    pub status: String,
    pub play_url: String,
    pub download_url: String,
}

impl CallFields {
    pub fn has_recording(&self) -> bool {
        !self.play_url.is_empty() || !self.download_url.is_empty()
    }
}

/// A stored call record.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub id: i64,
    pub company_id: i64,
    pub vendor_id: Option<String>,
    pub fingerprint: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub direction: Direction,
    pub source_number: String,
    pub destination_number: String,
    pub external_number: String,
    pub source_digits: String,
    pub destination_digits: String,
    pub external_digits: String,
    pub talk_seconds: i64,
    pub ring_seconds: i64,
    pub status: String,
    pub play_url: String,
    pub download_url: String,
    pub has_recording: bool,
    pub contact_id: Option<i64>,
    pub note: Option<String>,
    pub created_at: String,
}

impl CallRecord {
    /// The URL the recording proxy should fetch, preferring the play URL.
    pub fn recording_url(&self) -> Option<&str> {
        [self.play_url.as_str(), self.download_url.as_str()]
            .into_iter()
            .find(|u| !u.is_empty())
    }
}

/// Whether an upsert created a new record or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

// ============================================================================
// Contact Types
// ============================================================================

/// A contact owned by the host application.
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: i64,
    pub company_id: Option<i64>,
    pub name: String,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub phone_digits: String,
    pub mobile_digits: String,
}

impl Contact {
    pub fn matches_digits(&self, digits: &str) -> bool {
        !digits.is_empty() && (self.phone_digits == digits || self.mobile_digits == digits)
    }
}

// ============================================================================
// User Types
// ============================================================================

/// A user of the host application who may receive notifications.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub company_id: i64,
    pub active: bool,
    /// Portal/external users never receive fallback broadcasts.
    pub external: bool,
    pub last_seen_at: Option<String>,
}

/// A notification already delivered to a user's inbox.
#[derive(Debug, Clone, Serialize)]
pub struct StoredNotification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub sticky: bool,
    pub created_at: String,
}
