use colored::Colorize;

use crate::api::types::ConnectionReport;
use crate::config::BusinessTz;
use crate::models::{CallRecord, Contact, Direction, StoredNotification, User};
use crate::output::format::{format_seconds, format_when};
use crate::phone::{digits_only, pretty_format, MAX_INTERNAL_LEN};
use crate::sync::SyncSummary;

fn direction_label(direction: Direction) -> String {
    let label = format!("{:<6}", direction.as_str());
    match direction {
        Direction::In => label.green().to_string(),
        Direction::Out => label.cyan().to_string(),
        Direction::Missed => label.red().to_string(),
        Direction::Other => label.dimmed().to_string(),
    }
}

fn number_or_dash(number: &str) -> String {
    let number = number.trim();
    if number.is_empty() {
        "-".to_string()
    } else if digits_only(number).len() <= MAX_INTERNAL_LEN {
        number.to_string()
    } else {
        pretty_format(number)
    }
}

/// Format a call list entry for TTY display.
pub fn format_call_row(call: &CallRecord, tz: &BusinessTz) -> String {
    let id = format!("{:>5}", call.id).dimmed().to_string();
    let when = format_when(call.timestamp.as_ref(), tz).dimmed().to_string();
    let recording = if call.has_recording { "♪".yellow().to_string() } else { " ".to_string() };

    format!(
        "{} {} {} {} → {} {} {}",
        id,
        when,
        direction_label(call.direction),
        number_or_dash(&call.source_number).bold(),
        number_or_dash(&call.destination_number),
        format_seconds(call.talk_seconds).dimmed(),
        recording
    )
}

/// Format a call detail view for TTY.
pub fn format_call_detail(call: &CallRecord, contact: Option<&Contact>, tz: &BusinessTz) -> String {
    let mut lines = Vec::new();

    let title = format!("Call {}", call.id);
    lines.push(title.bold().to_string());
    lines.push("─".repeat(title.len()));

    lines.push(format!("{}      {}", "When:".dimmed(), format_when(call.timestamp.as_ref(), tz)));
    lines.push(format!("{} {}", "Direction:".dimmed(), call.direction));
    lines.push(format!("{}      {}", "From:".dimmed(), number_or_dash(&call.source_number)));
    lines.push(format!("{}        {}", "To:".dimmed(), number_or_dash(&call.destination_number)));
    lines.push(format!("{}      {}", "Line:".dimmed(), number_or_dash(&call.external_number)));
    lines.push(format!("{}      {}", "Talk:".dimmed(), format_seconds(call.talk_seconds)));
    lines.push(format!("{}      {}", "Ring:".dimmed(), format_seconds(call.ring_seconds)));
    if !call.status.is_empty() {
        lines.push(format!("{}    {}", "Status:".dimmed(), call.status));
    }
    if let Some(vendor_id) = &call.vendor_id {
        lines.push(format!("{} {}", "Vendor ID:".dimmed(), vendor_id));
    }

    match contact {
        Some(c) => lines.push(format!("{}   {} (#{})", "Contact:".dimmed(), c.name, c.id)),
        None => lines.push(format!("{}   {}", "Contact:".dimmed(), "(none)".dimmed())),
    }

    if call.has_recording {
        lines.push(String::new());
        lines.push("Recording:".dimmed().to_string());
        if !call.play_url.is_empty() {
            lines.push(format!("  {} {}", "play".dimmed(), call.play_url));
        }
        if !call.download_url.is_empty() {
            lines.push(format!("  {} {}", "download".dimmed(), call.download_url));
        }
        lines.push(format!("  {} /stream/{}", "proxy".dimmed(), call.id));
    }

    if let Some(note) = call.note.as_deref().filter(|n| !n.is_empty()) {
        lines.push(String::new());
        lines.push("Note:".dimmed().to_string());
        lines.push(format!("  {}", note));
    }

    lines.join("\n")
}

/// Format a contact for TTY list display.
pub fn format_contact_row(contact: &Contact) -> String {
    let numbers: Vec<String> = [contact.phone.as_deref(), contact.mobile.as_deref()]
        .into_iter()
        .flatten()
        .filter(|n| !n.is_empty())
        .map(pretty_format)
        .collect();
    format!(
        "{} {} {}",
        format!("{:>5}", contact.id).dimmed(),
        contact.name.bold(),
        numbers.join(", ").dimmed()
    )
}

pub fn format_user_row(user: &User, groups: &[String]) -> String {
    let mut flags = Vec::new();
    if !user.active {
        flags.push("inactive");
    }
    if user.external {
        flags.push("external");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    let groups = if groups.is_empty() {
        String::new()
    } else {
        format!(" groups: {}", groups.join(", "))
    };

    format!(
        "{} {} {}{}{}",
        format!("{:>5}", user.id).dimmed(),
        user.name.bold(),
        format!("company {}", user.company_id).dimmed(),
        flags.yellow(),
        groups.dimmed()
    )
}

pub fn format_notification_row(n: &StoredNotification) -> String {
    let pin = if n.sticky { " 📌" } else { "" };
    format!("{} {} {}{}", n.created_at.dimmed(), n.title.bold(), n.message, pin)
}

pub fn format_sync_summary(summary: &SyncSummary) -> String {
    format!(
        "Sync: {} processed, {} created, {} updated, {} skipped ({} page(s))",
        summary.processed, summary.created, summary.updated, summary.skipped, summary.pages
    )
}

pub fn format_connection_report(report: &ConnectionReport) -> String {
    if report.is_ok() {
        format!("{} {}", "✓".green(), report.summary())
    } else {
        format!("{} {}", "✗".red(), report.summary())
    }
}
