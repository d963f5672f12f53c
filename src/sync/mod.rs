//! Pull call history from the vendor into the local database.
//!
//! One run walks `Idle → Fetching(page) → Processing(page) → … → Notifying
//! → Idle`. Pages are fetched newest first until the vendor runs out, a
//! short page signals the end, or the page limit is reached.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::api::normalize::normalize_record;
use crate::api::{CallHistorySource, SyncWindow};
use crate::config::Settings;
use crate::models::UpsertOutcome;
use crate::notify::{self, Notifier};
use crate::resolver::{ContactResolver, NumberPolicy};
use crate::upsert::upsert_call;

/// Page limit for an interactive `callsync sync`.
pub const MANUAL_PAGE_LIMIT: u32 = 5;

/// Page limit for scheduled runs (`--auto`, `serve --poll-minutes`).
pub const AUTO_PAGE_LIMIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching(u32),
    Processing(u32),
    Notifying,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    /// Records dropped because their timestamp could not be parsed
    pub skipped: usize,
    pub pages: u32,
}

/// Run one sync into `settings.company_id`.
///
/// Transport and storage errors abort the run. Notification failures are
/// logged and ignored.
pub fn run_sync(
    conn: &Connection,
    source: &dyn CallHistorySource,
    settings: &Settings,
    notifier: &dyn Notifier,
    page_limit: u32,
    now: DateTime<Utc>,
    on_phase: &mut dyn FnMut(SyncPhase),
) -> Result<SyncSummary> {
    let tz = settings.tz();
    let per_page = settings.per_page.max(1);
    let window = SyncWindow::lookback(now, settings.lookback_days, tz).ok_or_else(|| {
        anyhow!(
            "lookback_days = {} reaches past the earliest representable date",
            settings.lookback_days
        )
    })?;
    debug!(
        "Sync window {} .. {} ({} per page, up to {} pages)",
        window.from_param(),
        window.to_param(),
        per_page,
        page_limit
    );

    let mut resolver = ContactResolver::new(NumberPolicy::from_settings(settings));
    let mut summary = SyncSummary::default();

    for page in 1..=page_limit {
        on_phase(SyncPhase::Fetching(page));
        let response = source
            .fetch_page(page, per_page, &window)
            .with_context(|| format!("Failed to fetch call history page {}", page))?;
        summary.pages = page;

        let records = response.data;
        if records.is_empty() {
            debug!("Page {} is empty, stopping", page);
            break;
        }

        on_phase(SyncPhase::Processing(page));
        for record in &records {
            let fields = normalize_record(record, tz);
            if fields.timestamp.is_none() {
                debug!("Skipping record without a parseable timestamp: {:?}", fields.vendor_id);
                summary.skipped += 1;
                continue;
            }

            let (_, outcome) = upsert_call(conn, settings.company_id, &fields, &mut resolver)?;
            summary.processed += 1;
            match outcome {
                UpsertOutcome::Created => summary.created += 1,
                UpsertOutcome::Updated => summary.updated += 1,
            }
        }

        let last_by_meta = response.meta.as_ref().is_some_and(|m| m.is_last());
        if records.len() < per_page as usize || last_by_meta {
            debug!("Page {} is the last page", page);
            break;
        }
    }

    on_phase(SyncPhase::Notifying);
    if let Err(e) = notify::broadcast(conn, settings, notifier, summary.created) {
        warn!("Failed to send new-call notifications: {:#}", e);
    }
    on_phase(SyncPhase::Idle);

    info!(
        "Sync done: {} processed, {} created, {} updated, {} skipped over {} page(s)",
        summary.processed, summary.created, summary.updated, summary.skipped, summary.pages
    );
    Ok(summary)
}
