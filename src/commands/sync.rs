//! `callsync sync` and `callsync test-connection`.

use std::io::{self, IsTerminal};

use anyhow::{bail, Result};
use chrono::Utc;
use log::debug;
use rusqlite::Connection;

use crate::api::VendorClient;
use crate::config::Settings;
use crate::notify::InboxNotifier;
use crate::output::format::OutputMode;
use crate::output::json::to_json;
use crate::output::progress::{create_spinner, SyncProgress};
use crate::output::table::{format_connection_report, format_sync_summary};
use crate::sync::{run_sync, AUTO_PAGE_LIMIT, MANUAL_PAGE_LIMIT};

/// Run the sync command
pub fn run(
    conn: &Connection,
    settings: &Settings,
    pages: Option<u32>,
    auto: bool,
    mode: OutputMode,
) -> Result<()> {
    let connection = settings.connection()?;
    let client = VendorClient::new(&connection)?;
    let default_limit = if auto { AUTO_PAGE_LIMIT } else { MANUAL_PAGE_LIMIT };
    let page_limit = pages.unwrap_or(default_limit).max(1);

    let interactive = !auto && mode == OutputMode::Tty;
    if interactive {
        eprintln!(
            "[callsync] Syncing up to {} page(s) from {}...",
            page_limit, connection.base_url
        );
    }
    let progress = interactive.then(SyncProgress::new);

    let notifier = InboxNotifier::new(conn);
    let result = run_sync(conn, &client, settings, &notifier, page_limit, Utc::now(), &mut |phase| {
        debug!("Sync phase: {:?}", phase);
        if let Some(p) = &progress {
            p.update(phase);
        }
    });
    if let Some(p) = &progress {
        p.finish();
    }
    let summary = result?;

    match mode {
        OutputMode::Json => {
            println!(
                "{}",
                to_json(&serde_json::json!({
                    "action": "sync",
                    "auto": auto,
                    "processed": summary.processed,
                    "created": summary.created,
                    "updated": summary.updated,
                    "skipped": summary.skipped,
                    "pages": summary.pages,
                }))
            );
        }
        OutputMode::Tty => println!("{}", format_sync_summary(&summary)),
    }
    Ok(())
}

/// Check the vendor API. Non-200 responses are reported and fail the command.
pub fn test_connection(settings: &Settings, mode: OutputMode) -> Result<()> {
    let client = VendorClient::new(&settings.connection()?)?;

    let spinner = (mode == OutputMode::Tty && io::stderr().is_terminal())
        .then(|| create_spinner("Contacting vendor API..."));
    let result = client.test_connection();
    if let Some(s) = &spinner {
        s.finish_and_clear();
    }
    let report = result?;

    match mode {
        OutputMode::Json => println!("{}", to_json(&report)),
        OutputMode::Tty => println!("{}", format_connection_report(&report)),
    }

    if !report.is_ok() {
        bail!("Connection test failed: HTTP {}", report.status);
    }
    Ok(())
}
