//! Shared test fixtures for db module tests
//!
//! In-memory databases built from the real migrations, plus candidate call
//! fields that the upsert and resolver tests tweak per case.

use chrono::{TimeZone, Utc};
use rusqlite::Connection;

use crate::db::migrations;
use crate::models::{CallFields, Direction};

/// Fresh in-memory database with the full schema.
pub fn test_db() -> Connection {
    migrations::open_in_memory().expect("in-memory database")
}

/// An inbound, recorded call from a mobile number to extension 101.
pub fn sample_fields() -> CallFields {
    CallFields {
        vendor_id: Some("v-100".to_string()),
        timestamp: Some(Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 5).unwrap()),
        direction: Direction::In,
        source_number: "+998 90 123 45 67".to_string(),
        destination_number: "101".to_string(),
        external_number: "998339993099".to_string(),
        talk_seconds: 125,
        ring_seconds: 7,
        status: "ANSWERED".to_string(),
        play_url: "https://rec.example/100.mp3".to_string(),
        download_url: "https://rec.example/100.mp3?dl=1".to_string(),
    }
}

/// Same shape as [`sample_fields`] but with no vendor id, so dedup falls
/// back to the fingerprint.
pub fn anonymous_fields() -> CallFields {
    CallFields {
        vendor_id: None,
        ..sample_fields()
    }
}
