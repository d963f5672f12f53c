//! Call record storage.
//!
//! Every write goes through [`insert_call`] or [`overwrite_call`], which
//! derive the digit columns, `has_recording` and the fingerprint from the
//! candidate fields before persisting. Callers never write derived columns.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    format_timestamp, parse_stored_timestamp, CallFields, CallRecord, Direction,
};
use crate::phone::digits_only;

const CALL_COLUMNS: &str = "id, company_id, vendor_id, fingerprint, occurred_at, direction, \
     source_number, destination_number, external_number, source_digits, destination_digits, \
     external_digits, talk_seconds, ring_seconds, status, play_url, download_url, has_recording, \
     contact_id, note, created_at";

// ============================================================================
// Fingerprint
// ============================================================================

/// Coarse dedup key: `direction|timestamp|src|dst|ext`.
///
/// Two calls with the same direction, second-precision timestamp and digit
/// forms collide on purpose. A missing timestamp contributes an empty field.
pub fn fingerprint(
    direction: Direction,
    timestamp: Option<&DateTime<Utc>>,
    source_digits: &str,
    destination_digits: &str,
    external_digits: &str,
) -> String {
    let ts = timestamp.map(format_timestamp).unwrap_or_default();
    format!(
        "{}|{}|{}|{}|{}",
        direction.as_str(),
        ts,
        source_digits,
        destination_digits,
        external_digits
    )
}

/// Fingerprint of candidate fields, normalizing numbers first.
pub fn fingerprint_for(fields: &CallFields) -> String {
    fingerprint(
        fields.direction,
        fields.timestamp.as_ref(),
        &digits_only(&fields.source_number),
        &digits_only(&fields.destination_number),
        &digits_only(&fields.external_number),
    )
}

/// Columns computed from [`CallFields`] on every write.
struct Derived {
    source_digits: String,
    destination_digits: String,
    external_digits: String,
    fingerprint: String,
    occurred_at: Option<String>,
    vendor_id: Option<String>,
}

fn derive(fields: &CallFields) -> Derived {
    Derived {
        source_digits: digits_only(&fields.source_number),
        destination_digits: digits_only(&fields.destination_number),
        external_digits: digits_only(&fields.external_number),
        fingerprint: fingerprint_for(fields),
        occurred_at: fields.timestamp.as_ref().map(format_timestamp),
        vendor_id: fields
            .vendor_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn read_call(row: &Row) -> rusqlite::Result<CallRecord> {
    let occurred_at: Option<String> = row.get(4)?;
    let direction: String = row.get(5)?;
    Ok(CallRecord {
        id: row.get(0)?,
        company_id: row.get(1)?,
        vendor_id: row.get(2)?,
        fingerprint: row.get(3)?,
        timestamp: occurred_at.as_deref().and_then(parse_stored_timestamp),
        direction: direction.parse().unwrap_or_default(),
        source_number: row.get(6)?,
        destination_number: row.get(7)?,
        external_number: row.get(8)?,
        source_digits: row.get(9)?,
        destination_digits: row.get(10)?,
        external_digits: row.get(11)?,
        talk_seconds: row.get(12)?,
        ring_seconds: row.get(13)?,
        status: row.get(14)?,
        play_url: row.get(15)?,
        download_url: row.get(16)?,
        has_recording: row.get(17)?,
        contact_id: row.get(18)?,
        note: row.get(19)?,
        created_at: row.get(20)?,
    })
}

// ============================================================================
// Writes
// ============================================================================

/// Insert a new call. Returns the raw rusqlite error so callers can detect
/// uniqueness violations.
pub fn insert_call(
    conn: &Connection,
    company_id: i64,
    fields: &CallFields,
) -> rusqlite::Result<i64> {
    let d = derive(fields);
    conn.execute(
        "INSERT INTO calls (company_id, vendor_id, fingerprint, occurred_at, direction,
            source_number, destination_number, external_number,
            source_digits, destination_digits, external_digits,
            talk_seconds, ring_seconds, status, play_url, download_url, has_recording)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            company_id,
            d.vendor_id,
            d.fingerprint,
            d.occurred_at,
            fields.direction.as_str(),
            fields.source_number,
            fields.destination_number,
            fields.external_number,
            d.source_digits,
            d.destination_digits,
            d.external_digits,
            fields.talk_seconds.max(0),
            fields.ring_seconds.max(0),
            fields.status,
            fields.play_url,
            fields.download_url,
            fields.has_recording(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite every synced field of call `id`, recomputing derived columns.
/// The contact link and note are left untouched.
pub fn overwrite_call(conn: &Connection, id: i64, fields: &CallFields) -> rusqlite::Result<()> {
    let d = derive(fields);
    conn.execute(
        "UPDATE calls SET
            vendor_id = COALESCE(?2, vendor_id),
            fingerprint = ?3,
            occurred_at = ?4,
            direction = ?5,
            source_number = ?6,
            destination_number = ?7,
            external_number = ?8,
            source_digits = ?9,
            destination_digits = ?10,
            external_digits = ?11,
            talk_seconds = ?12,
            ring_seconds = ?13,
            status = ?14,
            play_url = ?15,
            download_url = ?16,
            has_recording = ?17,
            updated_at = strftime('%Y-%m-%d %H:%M:%S', 'now')
         WHERE id = ?1",
        params![
            id,
            d.vendor_id,
            d.fingerprint,
            d.occurred_at,
            fields.direction.as_str(),
            fields.source_number,
            fields.destination_number,
            fields.external_number,
            d.source_digits,
            d.destination_digits,
            d.external_digits,
            fields.talk_seconds.max(0),
            fields.ring_seconds.max(0),
            fields.status,
            fields.play_url,
            fields.download_url,
            fields.has_recording(),
        ],
    )?;
    Ok(())
}

pub fn set_contact(conn: &Connection, call_id: i64, contact_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE calls SET contact_id = ?2 WHERE id = ?1",
        params![call_id, contact_id],
    )?;
    Ok(())
}

/// Merge call `from` into call `into` and delete `from`. The target keeps
/// its own contact link and note, taking `from`'s only where it has none.
pub fn fold_call(conn: &Connection, from: i64, into: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE calls SET
            contact_id = COALESCE(contact_id, (SELECT contact_id FROM calls WHERE id = ?1)),
            note = COALESCE(note, (SELECT note FROM calls WHERE id = ?1))
         WHERE id = ?2",
        params![from, into],
    )?;
    tx.execute("DELETE FROM calls WHERE id = ?1", [from])?;
    tx.commit()?;
    Ok(())
}

/// Delete calls by id. Returns the number actually removed.
pub fn delete_calls(conn: &Connection, ids: &[i64]) -> Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM calls WHERE id = ?1")?;
    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute([id])?;
    }
    Ok(deleted)
}

// ============================================================================
// Reads
// ============================================================================

pub fn find_id_by_vendor_id(
    conn: &Connection,
    company_id: i64,
    vendor_id: &str,
) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM calls WHERE company_id = ?1 AND vendor_id = ?2 LIMIT 1",
            params![company_id, vendor_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn find_id_by_fingerprint(
    conn: &Connection,
    company_id: i64,
    fingerprint: &str,
) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM calls WHERE company_id = ?1 AND fingerprint = ?2 LIMIT 1",
            params![company_id, fingerprint],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn get_call(conn: &Connection, id: i64) -> Result<Option<CallRecord>> {
    let sql = format!("SELECT {} FROM calls WHERE id = ?1", CALL_COLUMNS);
    Ok(conn.query_row(&sql, [id], read_call).optional()?)
}

/// Filters for [`list_calls`].
#[derive(Debug, Default, Clone)]
pub struct CallFilter {
    pub company_id: Option<i64>,
    pub direction: Option<Direction>,
    pub with_recording: bool,
    pub contact_id: Option<i64>,
    pub limit: Option<usize>,
}

/// Calls newest first.
pub fn list_calls(conn: &Connection, filter: &CallFilter) -> Result<Vec<CallRecord>> {
    let mut sql = format!("SELECT {} FROM calls WHERE 1=1", CALL_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(company_id) = filter.company_id {
        sql.push_str(" AND company_id = ?");
        params.push(Box::new(company_id));
    }
    if let Some(direction) = filter.direction {
        sql.push_str(" AND direction = ?");
        params.push(Box::new(direction.as_str()));
    }
    if filter.with_recording {
        sql.push_str(" AND has_recording = 1");
    }
    if let Some(contact_id) = filter.contact_id {
        sql.push_str(" AND contact_id = ?");
        params.push(Box::new(contact_id));
    }

    sql.push_str(" ORDER BY occurred_at DESC, id DESC");

    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        params.push(Box::new(limit as i64));
    }

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), read_call)?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Calls in `company_id` created strictly after `since` (all when `None`).
pub fn count_created_since(
    conn: &Connection,
    company_id: i64,
    since: Option<&str>,
) -> Result<usize> {
    let count: i64 = match since {
        Some(since) => conn.query_row(
            "SELECT COUNT(*) FROM calls WHERE company_id = ?1 AND created_at > ?2",
            params![company_id, since],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM calls WHERE company_id = ?1",
            [company_id],
            |row| row.get(0),
        )?,
    };
    Ok(count as usize)
}
