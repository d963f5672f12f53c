use anyhow::{anyhow, bail, Result};
use rusqlite::Connection;

use crate::cli::args::CallsAction;
use crate::cli::context::RunContext;
use crate::config::BusinessTz;
use crate::db::calls::{self, CallFilter};
use crate::db::contacts;
use crate::models::CallRecord;
use crate::notify::{announce_unseen, InboxNotifier};
use crate::output::format::OutputMode;
use crate::output::json;
use crate::output::table;

pub fn run(conn: &Connection, action: &CallsAction, company_id: i64, ctx: &RunContext) -> Result<()> {
    match action {
        CallsAction::List {
            limit,
            direction,
            with_recording,
            contact,
        } => {
            let filter = CallFilter {
                company_id: Some(company_id),
                direction: *direction,
                with_recording: *with_recording,
                contact_id: *contact,
                limit: (*limit > 0).then_some(*limit),
            };
            list(conn, &filter, ctx)
        }
        CallsAction::Show { id } => show(conn, *id, ctx),
        CallsAction::Delete { ids } => delete(conn, ids, ctx.output_mode),
        CallsAction::Play { id, server } => {
            let url = player_url(&load(conn, *id)?, server)?;
            println!("{}", url);
            Ok(())
        }
        CallsAction::Download { id } => {
            let url = download_url(&load(conn, *id)?)?;
            println!("{}", url);
            Ok(())
        }
        CallsAction::Unseen { user } => unseen(conn, *user, ctx.output_mode),
    }
}

fn load(conn: &Connection, id: i64) -> Result<CallRecord> {
    calls::get_call(conn, id)?.ok_or_else(|| anyhow!("Call {} not found", id))
}

fn list(conn: &Connection, filter: &CallFilter, ctx: &RunContext) -> Result<()> {
    let calls = calls::list_calls(conn, filter)?;

    match ctx.output_mode {
        OutputMode::Json => println!("{}", json::format_calls(&calls)),
        OutputMode::Tty => print_rows(&calls, &ctx.tz),
    }
    Ok(())
}

fn print_rows(calls: &[CallRecord], tz: &BusinessTz) {
    if calls.is_empty() {
        println!("No calls found.");
        return;
    }
    for call in calls {
        println!("{}", table::format_call_row(call, tz));
    }
}

fn show(conn: &Connection, id: i64, ctx: &RunContext) -> Result<()> {
    let call = load(conn, id)?;
    let contact = match call.contact_id {
        Some(contact_id) => contacts::get_contact(conn, contact_id)?,
        None => None,
    };

    match ctx.output_mode {
        OutputMode::Json => println!("{}", json::format_call_detail(&call, contact.as_ref())),
        OutputMode::Tty => println!("{}", table::format_call_detail(&call, contact.as_ref(), &ctx.tz)),
    }
    Ok(())
}

fn delete(conn: &Connection, ids: &[i64], mode: OutputMode) -> Result<()> {
    let deleted = calls::delete_calls(conn, ids)?;
    match mode {
        OutputMode::Json => println!(
            "{}",
            json::to_json(&serde_json::json!({"action": "delete", "deleted": deleted}))
        ),
        OutputMode::Tty => println!("Deleted {} call(s).", deleted),
    }
    if deleted < ids.len() {
        bail!("{} of {} call(s) did not exist", ids.len() - deleted, ids.len());
    }
    Ok(())
}

/// Player page URL on a running `callsync serve`.
pub fn player_url(call: &CallRecord, server: &str) -> Result<String> {
    if call.recording_url().is_none() {
        bail!("No play URL on this call.");
    }
    Ok(format!("{}/player/{}", server.trim_end_matches('/'), call.id))
}

pub fn download_url(call: &CallRecord) -> Result<String> {
    if call.download_url.is_empty() {
        bail!("No download URL on this call.");
    }
    Ok(call.download_url.clone())
}

fn unseen(conn: &Connection, user_id: i64, mode: OutputMode) -> Result<()> {
    let notifier = InboxNotifier::new(conn);
    let count = announce_unseen(conn, &notifier, user_id)?;
    match mode {
        OutputMode::Json => println!(
            "{}",
            json::to_json(&serde_json::json!({"user_id": user_id, "new_calls": count}))
        ),
        OutputMode::Tty => println!("{} new call(s) since last visit.", count),
    }
    Ok(())
}
