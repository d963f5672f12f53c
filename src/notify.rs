//! "New calls" notifications.

use anyhow::{anyhow, Result};
use log::{debug, info};
use rusqlite::Connection;

use crate::config::Settings;
use crate::db::{calls, users};
use crate::models::User;

pub const TITLE: &str = "Calls";

/// One message for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub sticky: bool,
}

/// Delivery channel for notifications.
pub trait Notifier {
    fn deliver(&self, notifications: &[Notification]) -> Result<()>;
}

/// Writes notifications into the local `notifications` table.
pub struct InboxNotifier<'a> {
    conn: &'a Connection,
}

impl<'a> InboxNotifier<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Notifier for InboxNotifier<'_> {
    fn deliver(&self, notifications: &[Notification]) -> Result<()> {
        for n in notifications {
            users::insert_notification(self.conn, n.user_id, &n.title, &n.message, n.sticky)?;
        }
        Ok(())
    }
}

/// Who gets notified in `company_id`: active members of `group` when set,
/// otherwise every active internal user. A group with no active members
/// falls back to the internal users as well.
pub fn targets(conn: &Connection, group: Option<&str>, company_id: i64) -> Result<Vec<User>> {
    if let Some(group) = group.map(str::trim).filter(|g| !g.is_empty()) {
        let members = users::active_group_members(conn, group, company_id)?;
        if !members.is_empty() {
            return Ok(members);
        }
        debug!("Group '{}' has no active members, notifying internal users", group);
    }
    users::active_internal_users(conn, company_id)
}

pub fn imported_message(count: usize) -> String {
    format!("{} new call(s) imported.", count)
}

/// Tell every target about `count` newly imported calls. Returns how many
/// notifications were handed to `notifier`.
pub fn broadcast(
    conn: &Connection,
    settings: &Settings,
    notifier: &dyn Notifier,
    count: usize,
) -> Result<usize> {
    if count == 0 || !settings.notify_enabled {
        return Ok(0);
    }

    let recipients = targets(conn, settings.notify_group.as_deref(), settings.company_id)?;
    if recipients.is_empty() {
        debug!("No notification targets in company {}", settings.company_id);
        return Ok(0);
    }

    let message = imported_message(count);
    let batch: Vec<Notification> = recipients
        .iter()
        .map(|user| Notification {
            user_id: user.id,
            title: TITLE.to_string(),
            message: message.clone(),
            sticky: false,
        })
        .collect();

    notifier.deliver(&batch)?;
    info!("Notified {} user(s): {}", batch.len(), message);
    Ok(batch.len())
}

/// Count calls created since the user's last visit, notify them once, and
/// stamp the visit. Returns the count.
pub fn announce_unseen(conn: &Connection, notifier: &dyn Notifier, user_id: i64) -> Result<usize> {
    let user = users::get_user(conn, user_id)?.ok_or_else(|| anyhow!("User {} not found", user_id))?;
    let count = calls::count_created_since(conn, user.company_id, user.last_seen_at.as_deref())?;

    if count > 0 {
        notifier.deliver(&[Notification {
            user_id,
            title: TITLE.to_string(),
            message: format!("{} new calls since your last visit.", count),
            sticky: false,
        }])?;
    }
    users::mark_seen(conn, user_id)?;
    Ok(count)
}
