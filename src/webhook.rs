//! Push-based call ingestion.
//!
//! The vendor (or a relay) POSTs call records instead of waiting for the
//! next poll. Bodies arrive as JSON, as a form with a `payload` field, or as
//! bare text; [`WebhookBody`] decides which once, at the boundary.

use anyhow::Result;
use log::{debug, warn};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::api::normalize::normalize_record;
use crate::api::VendorRecord;
use crate::config::{BusinessTz, Settings};
use crate::models::UpsertOutcome;
use crate::resolver::{ContactResolver, NumberPolicy};
use crate::upsert::upsert_call;

const BEARER_PREFIX: &str = "bearer ";

/// A request body, classified by content type.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Text(String),
}

impl WebhookBody {
    pub fn classify(content_type: Option<&str>, bytes: &[u8]) -> Self {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

        if content_type.contains("application/x-www-form-urlencoded") {
            let pairs = url::form_urlencoded::parse(bytes).into_owned().collect();
            return WebhookBody::Form(pairs);
        }
        if content_type.contains("json") {
            if let Ok(value) = serde_json::from_slice(bytes) {
                return WebhookBody::Json(value);
            }
        }
        WebhookBody::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    /// The JSON document carried by this body, if any.
    ///
    /// Forms yield their `payload` field parsed as JSON, or the form fields
    /// themselves as one flat record.
    pub fn into_value(self) -> Option<Value> {
        match self {
            WebhookBody::Json(value) => Some(value),
            WebhookBody::Text(text) => serde_json::from_str(text.trim()).ok(),
            WebhookBody::Form(pairs) => {
                if let Some((_, payload)) = pairs.iter().find(|(k, _)| k == "payload") {
                    return serde_json::from_str(payload.trim()).ok();
                }
                if pairs.is_empty() {
                    return None;
                }
                let map: Map<String, Value> = pairs
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                Some(Value::Object(map))
            }
        }
    }
}

/// Flatten the accepted payload shapes into a list of records:
/// a bare list, `{"data": [...]}`, or a single object.
pub fn records_from(value: Value) -> Vec<VendorRecord> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Object(single)) => vec![Value::Object(single)],
            Some(other) => {
                map.insert("data".to_string(), other);
                vec![Value::Object(map)]
            }
            None => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Check the `Authorization` header against the configured secret.
///
/// Accepts the bare secret or `Bearer <secret>` (any case). Without a
/// configured secret every request is rejected.
pub fn authorize(header: Option<&str>, secret: Option<&str>) -> bool {
    let Some(secret) = secret.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(header) = header.map(str::trim).filter(|h| !h.is_empty()) else {
        return false;
    };

    let presented = match header.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
            header[BEARER_PREFIX.len()..].trim()
        }
        _ => header,
    };
    presented == secret
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub ok: bool,
    pub created: usize,
    pub updated: usize,
    #[serde(skip)]
    pub failed: usize,
}

/// Upsert every record, logging and skipping the ones that fail.
pub fn ingest(conn: &Connection, settings: &Settings, records: &[VendorRecord]) -> IngestSummary {
    let tz = settings.tz();
    let mut resolver = ContactResolver::new(NumberPolicy::from_settings(settings));
    let mut summary = IngestSummary {
        ok: true,
        ..Default::default()
    };

    for (i, record) in records.iter().enumerate() {
        match ingest_one(conn, settings.company_id, record, tz, &mut resolver) {
            Ok(Some(UpsertOutcome::Created)) => summary.created += 1,
            Ok(Some(UpsertOutcome::Updated)) => summary.updated += 1,
            Ok(None) => {
                debug!("Webhook record {} has neither an id nor a timestamp, skipped", i);
                summary.failed += 1;
            }
            Err(e) => {
                warn!("Webhook record {} failed: {:#}", i, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

fn ingest_one(
    conn: &Connection,
    company_id: i64,
    record: &VendorRecord,
    tz: BusinessTz,
    resolver: &mut ContactResolver,
) -> Result<Option<UpsertOutcome>> {
    let fields = normalize_record(record, tz);
    if fields.vendor_id.is_none() && fields.timestamp.is_none() {
        return Ok(None);
    }
    let (_, outcome) = upsert_call(conn, company_id, &fields, resolver)?;
    Ok(Some(outcome))
}
