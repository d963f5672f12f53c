use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::Contact;
use crate::phone::{digits_only, tail};

/// Upper bound on rows pulled by the tail substring search before exact
/// filtering.
const TAIL_SEARCH_LIMIT: usize = 50;

const CONTACT_COLUMNS: &str =
    "id, company_id, name, phone, mobile, phone_digits, mobile_digits";

fn read_contact(row: &Row) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        mobile: row.get(4)?,
        phone_digits: row.get(5)?,
        mobile_digits: row.get(6)?,
    })
}

/// Insert a contact, deriving its digit columns.
pub fn insert_contact(
    conn: &Connection,
    company_id: Option<i64>,
    name: &str,
    phone: Option<&str>,
    mobile: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO contacts (company_id, name, phone, mobile, phone_digits, mobile_digits)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            company_id,
            name,
            phone,
            mobile,
            phone.map(digits_only).unwrap_or_default(),
            mobile.map(digits_only).unwrap_or_default(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_contact(conn: &Connection, id: i64) -> Result<Option<Contact>> {
    let sql = format!("SELECT {} FROM contacts WHERE id = ?1", CONTACT_COLUMNS);
    Ok(conn.query_row(&sql, [id], read_contact).optional()?)
}

/// Contacts whose phone or mobile digits equal `digits` exactly.
///
/// Contacts in `company_id` sort first, then shared contacts (no company),
/// then everyone else; ties break by age.
pub fn find_exact_by_digits(
    conn: &Connection,
    digits: &str,
    company_id: i64,
) -> Result<Vec<Contact>> {
    if digits.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {} FROM contacts
         WHERE phone_digits = ?1 OR mobile_digits = ?1
         ORDER BY CASE
             WHEN company_id = ?2 THEN 0
             WHEN company_id IS NULL THEN 1
             ELSE 2
         END, id",
        CONTACT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![digits, company_id], read_contact)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Broad search on the last seven digits. Results may include numbers that
/// merely contain the tail; callers filter with [`Contact::matches_digits`].
pub fn find_by_tail(conn: &Connection, digits: &str, company_id: i64) -> Result<Vec<Contact>> {
    let tail = tail(digits);
    if tail.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{}%", tail);
    let sql = format!(
        "SELECT {} FROM contacts
         WHERE phone_digits LIKE ?1 OR mobile_digits LIKE ?1
         ORDER BY CASE WHEN company_id = ?2 THEN 0 ELSE 1 END, id
         LIMIT ?3",
        CONTACT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![pattern, company_id, TAIL_SEARCH_LIMIT as i64],
        read_contact,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// All contacts, optionally filtered by a name or number fragment.
pub fn list_contacts(conn: &Connection, search: Option<&str>) -> Result<Vec<Contact>> {
    let mut sql = format!("SELECT {} FROM contacts", CONTACT_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(" WHERE name LIKE ? COLLATE NOCASE");
        params.push(Box::new(format!("%{}%", search)));

        let digits = digits_only(search);
        if !digits.is_empty() {
            sql.push_str(" OR phone_digits LIKE ? OR mobile_digits LIKE ?");
            let pattern = format!("%{}%", digits);
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }
    }
    sql.push_str(" ORDER BY name COLLATE NOCASE, id");

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), read_contact)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
