//! Minimal user directory and notification inbox.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{StoredNotification, User};

const USER_COLUMNS: &str = "u.id, u.name, u.company_id, u.active, u.external, u.last_seen_at";

fn read_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        company_id: row.get(2)?,
        active: row.get(3)?,
        external: row.get(4)?,
        last_seen_at: row.get(5)?,
    })
}

/// Add a user and their group memberships in one transaction.
pub fn add_user(
    conn: &mut Connection,
    name: &str,
    company_id: i64,
    external: bool,
    groups: &[String],
) -> Result<i64> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO users (name, company_id, external) VALUES (?1, ?2, ?3)",
        params![name, company_id, external],
    )?;
    let id = tx.last_insert_rowid();
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO user_groups (group_name, user_id) VALUES (?1, ?2)")?;
        for group in groups.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
            stmt.execute(params![group, id])?;
        }
    }
    tx.commit()?;
    Ok(id)
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [id], read_user).optional()?)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM users u ORDER BY u.id", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_user)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Group names per user, for listing.
pub fn user_groups(conn: &Connection, user_id: i64) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT group_name FROM user_groups WHERE user_id = ?1 ORDER BY group_name")?;
    let rows = stmt.query_map([user_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Active members of `group` within `company_id`. External users are
/// included when explicitly grouped.
pub fn active_group_members(conn: &Connection, group: &str, company_id: i64) -> Result<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users u
         JOIN user_groups g ON g.user_id = u.id
         WHERE g.group_name = ?1 AND u.company_id = ?2 AND u.active = 1
         ORDER BY u.id",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![group, company_id], read_user)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Active, non-external users of `company_id`.
pub fn active_internal_users(conn: &Connection, company_id: i64) -> Result<Vec<User>> {
    let sql = format!(
        "SELECT {} FROM users u
         WHERE u.company_id = ?1 AND u.active = 1 AND u.external = 0
         ORDER BY u.id",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([company_id], read_user)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Stamp the user's last visit with the current time.
pub fn mark_seen(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET last_seen_at = strftime('%Y-%m-%d %H:%M:%S', 'now') WHERE id = ?1",
        [user_id],
    )?;
    Ok(())
}

// ============================================================================
// Notifications
// ============================================================================

pub fn insert_notification(
    conn: &Connection,
    user_id: i64,
    title: &str,
    message: &str,
    sticky: bool,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO notifications (user_id, title, message, sticky) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, title, message, sticky],
    )?;
    Ok(conn.last_insert_rowid())
}

/// A user's notifications, newest first.
pub fn list_notifications(conn: &Connection, user_id: i64) -> Result<Vec<StoredNotification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, message, sticky, created_at
         FROM notifications WHERE user_id = ?1
         ORDER BY id DESC",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(StoredNotification {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            message: row.get(3)?,
            sticky: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
