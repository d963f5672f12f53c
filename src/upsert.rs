//! Find-or-create for call records.
//!
//! Lookup order is vendor id first, then fingerprint, both within the
//! company scope. The unique indexes on `calls` catch whatever slips past
//! the lookup when two writers race.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use rusqlite::{Connection, ErrorCode};

use crate::db::calls::{
    find_id_by_fingerprint, find_id_by_vendor_id, fingerprint_for, fold_call, get_call,
    insert_call, overwrite_call,
};
use crate::models::{CallFields, CallRecord, UpsertOutcome};
use crate::resolver::ContactResolver;

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Existing call matching `fields` in `company_id`, if any.
pub fn find_existing(conn: &Connection, company_id: i64, fields: &CallFields) -> Result<Option<i64>> {
    if let Some(vendor_id) = fields.vendor_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        if let Some(id) = find_id_by_vendor_id(conn, company_id, vendor_id)? {
            return Ok(Some(id));
        }
    }
    find_id_by_fingerprint(conn, company_id, &fingerprint_for(fields))
}

/// Create or overwrite the call described by `fields`, then link a contact.
pub fn upsert_call(
    conn: &Connection,
    company_id: i64,
    fields: &CallFields,
    resolver: &mut ContactResolver,
) -> Result<(CallRecord, UpsertOutcome)> {
    if let Some(id) = find_existing(conn, company_id, fields)? {
        let call = update_call(conn, id, fields, resolver)?;
        return Ok((call, UpsertOutcome::Updated));
    }

    match insert_call(conn, company_id, fields) {
        Ok(id) => {
            let call = load(conn, id)?;
            debug!("Created call {} ({})", id, call.fingerprint);
            link_contact(conn, resolver, &call);
            Ok((load(conn, id)?, UpsertOutcome::Created))
        }
        Err(e) if is_constraint_violation(&e) => {
            // Lost a race with another writer: the row exists now
            let id = find_existing(conn, company_id, fields)?
                .ok_or_else(|| anyhow!("Call insert conflicted but no existing row was found"))?;
            debug!("Insert conflicted, updating call {} instead", id);
            let call = update_call(conn, id, fields, resolver)?;
            Ok((call, UpsertOutcome::Updated))
        }
        Err(e) => Err(e).context("Failed to insert call"),
    }
}

/// Overwrite call `id` with `fields`, recomputing derived columns.
///
/// The contact link step re-runs when direction, timestamp or any number
/// changed, or when the call has no contact yet.
///
/// If the new fingerprint already belongs to another row, that row is the
/// same call stored twice and is folded into `id`.
pub fn update_call(
    conn: &Connection,
    id: i64,
    fields: &CallFields,
    resolver: &mut ContactResolver,
) -> Result<CallRecord> {
    let before = load(conn, id)?;
    match overwrite_call(conn, id, fields) {
        Ok(()) => {}
        Err(e) if is_constraint_violation(&e) => {
            let fingerprint = fingerprint_for(fields);
            let holder = find_id_by_fingerprint(conn, before.company_id, &fingerprint)?
                .filter(|&holder| holder != id)
                .ok_or_else(|| anyhow!("Failed to update call {}: {}", id, e))?;
            warn!(
                "Call {} now has fingerprint {} held by call {}; merging the two",
                id, fingerprint, holder
            );
            fold_call(conn, holder, id)?;
            overwrite_call(conn, id, fields)
                .with_context(|| format!("Failed to update call {}", id))?;
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to update call {}", id)),
    }
    let after = load(conn, id)?;

    if key_fields_changed(&before, &after) || after.contact_id.is_none() {
        link_contact(conn, resolver, &after);
        return load(conn, id);
    }
    Ok(after)
}

fn key_fields_changed(before: &CallRecord, after: &CallRecord) -> bool {
    before.direction != after.direction
        || before.timestamp != after.timestamp
        || before.source_digits != after.source_digits
        || before.destination_digits != after.destination_digits
        || before.external_digits != after.external_digits
}

fn load(conn: &Connection, id: i64) -> Result<CallRecord> {
    get_call(conn, id)?.ok_or_else(|| anyhow!("Call {} disappeared during upsert", id))
}

/// Contact matching is best-effort; failures never fail the upsert.
fn link_contact(conn: &Connection, resolver: &mut ContactResolver, call: &CallRecord) {
    if let Err(e) = resolver.resolve_or_create(conn, call) {
        warn!("Contact resolution failed for call {}: {:#}", call.id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::calls::list_calls;
    use crate::db::test_fixtures::{anonymous_fields, sample_fields, test_db};
    use crate::models::Direction;
    use crate::resolver::NumberPolicy;

    fn resolver() -> ContactResolver {
        ContactResolver::new(NumberPolicy::default())
    }

    fn call_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM calls", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_same_vendor_id_overwrites() {
        let conn = test_db();
        let mut resolver = resolver();

        let (first, outcome) = upsert_call(&conn, 1, &sample_fields(), &mut resolver).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let mut changed = sample_fields();
        changed.talk_seconds = 300;
        changed.status = "COMPLETED".to_string();
        changed.timestamp = changed.timestamp.map(|t| t + chrono::Duration::seconds(30));
        let (second, outcome) = upsert_call(&conn, 1, &changed, &mut resolver).unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.talk_seconds, 300);
        assert_eq!(second.status, "COMPLETED");
        assert_eq!(second.fingerprint, fingerprint_for(&changed));
        assert_eq!(call_count(&conn), 1);
    }

    #[test]
    fn test_fingerprint_dedup_without_vendor_id() {
        let conn = test_db();
        let mut resolver = resolver();

        let (_, a) = upsert_call(&conn, 1, &anonymous_fields(), &mut resolver).unwrap();
        let mut again = anonymous_fields();
        again.talk_seconds = 1;
        let (call, b) = upsert_call(&conn, 1, &again, &mut resolver).unwrap();

        assert_eq!(a, UpsertOutcome::Created);
        assert_eq!(b, UpsertOutcome::Updated);
        assert_eq!(call.talk_seconds, 1);
        assert_eq!(call_count(&conn), 1);
    }

    #[test]
    fn test_fingerprint_match_adopts_vendor_id() {
        let conn = test_db();
        let mut resolver = resolver();
        upsert_call(&conn, 1, &anonymous_fields(), &mut resolver).unwrap();
        let (call, outcome) = upsert_call(&conn, 1, &sample_fields(), &mut resolver).unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(call.vendor_id.as_deref(), Some("v-100"));
        assert_eq!(call_count(&conn), 1);
    }

    #[test]
    fn test_scopes_are_independent() {
        let conn = test_db();
        let mut resolver = resolver();
        let (_, a) = upsert_call(&conn, 1, &sample_fields(), &mut resolver).unwrap();
        let (_, b) = upsert_call(&conn, 2, &sample_fields(), &mut resolver).unwrap();
        assert_eq!(a, UpsertOutcome::Created);
        assert_eq!(b, UpsertOutcome::Created);
        assert_eq!(call_count(&conn), 2);
    }

    #[test]
    fn test_upsert_links_contact() {
        let conn = test_db();
        let (call, _) = upsert_call(&conn, 1, &sample_fields(), &mut resolver()).unwrap();
        assert!(call.contact_id.is_some());
    }

    #[test]
    fn test_update_relinks_when_numbers_change() {
        let conn = test_db();
        let mut resolver = resolver();
        let (call, _) = upsert_call(&conn, 1, &sample_fields(), &mut resolver).unwrap();
        conn.execute("UPDATE calls SET contact_id = NULL WHERE id = ?1", [call.id])
            .unwrap();

        let mut changed = sample_fields();
        changed.direction = Direction::Out;
        changed.destination_number = "+998 93 555 00 00".to_string();
        changed.source_number = "101".to_string();
        let updated = update_call(&conn, call.id, &changed, &mut resolver).unwrap();

        let contact_id = updated.contact_id.expect("relinked");
        let contact = crate::db::contacts::get_contact(&conn, contact_id)
            .unwrap()
            .unwrap();
        assert_eq!(contact.phone_digits, "998935550000");
    }

    #[test]
    fn test_update_onto_held_fingerprint_merges_rows() {
        let conn = test_db();
        let mut resolver = resolver();

        let mut early = sample_fields();
        early.timestamp = early.timestamp.map(|t| t + chrono::Duration::minutes(10));
        let (tracked, _) = upsert_call(&conn, 1, &early, &mut resolver).unwrap();
        let (anonymous, outcome) = upsert_call(&conn, 1, &anonymous_fields(), &mut resolver).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_ne!(tracked.id, anonymous.id);
        conn.execute("UPDATE calls SET note = 'vip' WHERE id = ?1", [anonymous.id])
            .unwrap();

        // The vendor corrects v-100's time to the anonymous row's time
        let (call, outcome) = upsert_call(&conn, 1, &sample_fields(), &mut resolver).unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(call.id, tracked.id);
        assert_eq!(call.fingerprint, fingerprint_for(&sample_fields()));
        assert_eq!(call.note.as_deref(), Some("vip"));
        assert!(call.contact_id.is_some());
        assert_eq!(call_count(&conn), 1);
    }

    #[test]
    fn test_update_keeps_existing_link_and_note() {
        let conn = test_db();
        let mut resolver = resolver();
        let (call, _) = upsert_call(&conn, 1, &sample_fields(), &mut resolver).unwrap();
        conn.execute("UPDATE calls SET note = 'call back' WHERE id = ?1", [call.id])
            .unwrap();

        let mut changed = sample_fields();
        changed.ring_seconds = 20;
        let updated = update_call(&conn, call.id, &changed, &mut resolver).unwrap();
        assert_eq!(updated.contact_id, call.contact_id);
        assert_eq!(updated.note.as_deref(), Some("call back"));
        assert_eq!(list_calls(&conn, &Default::default()).unwrap().len(), 1);
    }
}
