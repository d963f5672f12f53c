//! Link calls to contacts by phone number.
//!
//! A [`ContactResolver`] lives for one sync run (or one webhook batch). Its
//! cache maps `(company, digits)` to the contact found or created for that
//! number, so a number seen twice in the same run never creates two
//! contacts.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use log::debug;
use rusqlite::Connection;

use crate::config::Settings;
use crate::db::{calls, contacts};
use crate::models::{CallRecord, Direction};
use crate::phone::{compact_form, digits_only, pretty_format, to_country_form, MAX_INTERNAL_LEN};

/// Which numbers belong to the tenant and must never resolve to a contact.
#[derive(Debug, Clone, Default)]
pub struct NumberPolicy {
    dids: HashSet<String>,
    extensions: HashSet<String>,
}

impl NumberPolicy {
    pub fn new<D, E>(dids: D, extensions: E) -> Self
    where
        D: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        Self {
            dids: dids
                .into_iter()
                .map(|d| to_country_form(&d))
                .filter(|d| !d.is_empty())
                .collect(),
            extensions: extensions
                .into_iter()
                .map(|e| digits_only(&e))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.did_digits(), settings.extension_digits())
    }

    fn is_internal(&self, digits: &str, country: &str) -> bool {
        digits.len() <= MAX_INTERNAL_LEN
            || self.extensions.contains(digits)
            || self.dids.contains(country)
    }
}

/// What [`ContactResolver::resolve_or_create`] did for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    AlreadyLinked,
    NoCandidates,
    Linked(i64),
    Created(i64),
}

pub struct ContactResolver {
    policy: NumberPolicy,
    cache: HashMap<(i64, String), i64>,
}

impl ContactResolver {
    pub fn new(policy: NumberPolicy) -> Self {
        Self {
            policy,
            cache: HashMap::new(),
        }
    }

    /// External numbers of `call` worth looking up, in country form, most
    /// likely first.
    ///
    /// Inbound calls try the source first, outbound the destination.
    /// Configured DIDs, the call's own external (DID) number, configured
    /// extensions and anything of five digits or fewer are dropped.
    pub fn candidate_numbers(&self, call: &CallRecord) -> Vec<String> {
        let ordered = match call.direction {
            Direction::Out => [&call.destination_number, &call.source_number],
            Direction::In | Direction::Missed | Direction::Other => {
                [&call.source_number, &call.destination_number]
            }
        };
        let own_line = to_country_form(&call.external_number);

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for number in ordered {
            let digits = digits_only(number);
            if digits.is_empty() {
                continue;
            }
            let country = to_country_form(&digits);
            if self.policy.is_internal(&digits, &country) {
                continue;
            }
            if !own_line.is_empty() && country == own_line {
                continue;
            }
            if seen.insert(country.clone()) {
                candidates.push(country);
            }
        }
        candidates
    }

    /// Look up an existing contact for any of `candidates`.
    pub fn find_contact(
        &mut self,
        conn: &Connection,
        company_id: i64,
        candidates: &[String],
    ) -> Result<Option<i64>> {
        for digits in candidates {
            let key = (company_id, digits.clone());
            if let Some(&id) = self.cache.get(&key) {
                debug!("Contact cache hit for {}: {}", compact_form(digits), id);
                return Ok(Some(id));
            }

            if let Some(contact) = contacts::find_exact_by_digits(conn, digits, company_id)?
                .into_iter()
                .next()
            {
                self.cache.insert(key, contact.id);
                return Ok(Some(contact.id));
            }

            if let Some(contact) = contacts::find_by_tail(conn, digits, company_id)?
                .into_iter()
                .find(|c| c.matches_digits(digits))
            {
                self.cache.insert(key, contact.id);
                return Ok(Some(contact.id));
            }
        }
        Ok(None)
    }

    /// Link `call` to a contact, creating one from the first candidate
    /// number when nothing matches. Calls that already have a contact are
    /// left alone.
    pub fn resolve_or_create(&mut self, conn: &Connection, call: &CallRecord) -> Result<Resolution> {
        if call.contact_id.is_some() {
            return Ok(Resolution::AlreadyLinked);
        }

        let candidates = self.candidate_numbers(call);
        let Some(first) = candidates.first() else {
            debug!("Call {} has no external numbers, skipping contact link", call.id);
            return Ok(Resolution::NoCandidates);
        };

        if let Some(contact_id) = self.find_contact(conn, call.company_id, &candidates)? {
            calls::set_contact(conn, call.id, contact_id)?;
            return Ok(Resolution::Linked(contact_id));
        }

        let name = pretty_format(first);
        let phone = compact_form(first);
        let contact_id = contacts::insert_contact(conn, Some(call.company_id), &name, Some(&phone), None)?;
        debug!("Created contact {} ({}) for call {}", contact_id, name, call.id);

        self.cache.insert((call.company_id, first.clone()), contact_id);
        calls::set_contact(conn, call.id, contact_id)?;
        Ok(Resolution::Created(contact_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::calls::{get_call, insert_call};
    use crate::db::test_fixtures::{sample_fields, test_db};
    use crate::models::CallFields;

    fn stored(conn: &Connection, company_id: i64, fields: &CallFields) -> CallRecord {
        let id = insert_call(conn, company_id, fields).unwrap();
        get_call(conn, id).unwrap().unwrap()
    }

    fn resolver() -> ContactResolver {
        ContactResolver::new(NumberPolicy::new(
            vec!["+998 71 200 00 00".to_string()],
            vec!["2000".to_string()],
        ))
    }

    fn contact_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_candidates_ordered_by_direction() {
        let conn = test_db();
        let mut fields = sample_fields();
        fields.source_number = "901234567".to_string();
        fields.destination_number = "+998 93 555 00 00".to_string();
        fields.external_number.clear();

        let inbound = stored(&conn, 1, &fields);
        assert_eq!(
            resolver().candidate_numbers(&inbound),
            vec!["998901234567", "998935550000"]
        );

        fields.direction = Direction::Out;
        fields.vendor_id = Some("v-out".to_string());
        let outbound = stored(&conn, 1, &fields);
        assert_eq!(
            resolver().candidate_numbers(&outbound),
            vec!["998935550000", "998901234567"]
        );
    }

    #[test]
    fn test_candidates_exclude_internal_numbers() {
        let conn = test_db();
        let mut fields = sample_fields();
        // DID in national form still matches the configured country form
        fields.source_number = "712000000".to_string();
        fields.destination_number = "2000".to_string();
        fields.external_number.clear();
        let call = stored(&conn, 1, &fields);
        assert!(resolver().candidate_numbers(&call).is_empty());

        let mut fields = sample_fields();
        fields.vendor_id = Some("v-2".to_string());
        fields.source_number = "12345".to_string();
        fields.destination_number = "998339993099".to_string();
        // The call's own external number counts as a DID
        fields.external_number = "+998 33 999 30 99".to_string();
        let call = stored(&conn, 1, &fields);
        assert!(resolver().candidate_numbers(&call).is_empty());
    }

    #[test]
    fn test_candidates_deduplicated() {
        let conn = test_db();
        let mut fields = sample_fields();
        fields.direction = Direction::Missed;
        fields.source_number = "901234567".to_string();
        fields.destination_number = "998901234567".to_string();
        let call = stored(&conn, 1, &fields);
        assert_eq!(resolver().candidate_numbers(&call), vec!["998901234567"]);
    }

    #[test]
    fn test_resolve_links_existing_contact() {
        let conn = test_db();
        let existing =
            contacts::insert_contact(&conn, Some(1), "Known", None, Some("+998 90 123-45-67")).unwrap();
        let call = stored(&conn, 1, &sample_fields());

        let outcome = resolver().resolve_or_create(&conn, &call).unwrap();
        assert_eq!(outcome, Resolution::Linked(existing));
        assert_eq!(get_call(&conn, call.id).unwrap().unwrap().contact_id, Some(existing));
    }

    #[test]
    fn test_resolve_creates_once_per_number() {
        let conn = test_db();
        let mut resolver = resolver();

        let first = stored(&conn, 1, &sample_fields());
        let mut again = sample_fields();
        again.vendor_id = Some("v-101".to_string());
        again.talk_seconds = 3;
        again.timestamp = again.timestamp.map(|t| t + chrono::Duration::minutes(5));
        let second = stored(&conn, 1, &again);

        let created = match resolver.resolve_or_create(&conn, &first).unwrap() {
            Resolution::Created(id) => id,
            other => panic!("expected a new contact, got {:?}", other),
        };
        assert_eq!(
            resolver.resolve_or_create(&conn, &second).unwrap(),
            Resolution::Linked(created)
        );
        assert_eq!(contact_count(&conn), 1);

        let contact = contacts::get_contact(&conn, created).unwrap().unwrap();
        assert_eq!(contact.name, "+998 90 123 45 67");
        assert_eq!(contact.phone.as_deref(), Some("+998901234567"));
        assert_eq!(contact.company_id, Some(1));
    }

    #[test]
    fn test_resolve_across_runs_uses_exact_match() {
        let conn = test_db();
        let first = stored(&conn, 1, &sample_fields());
        resolver().resolve_or_create(&conn, &first).unwrap();

        let mut later = sample_fields();
        later.vendor_id = Some("v-later".to_string());
        later.timestamp = later.timestamp.map(|t| t + chrono::Duration::hours(1));
        let second = stored(&conn, 1, &later);
        // Fresh resolver: empty cache
        assert!(matches!(
            resolver().resolve_or_create(&conn, &second).unwrap(),
            Resolution::Linked(_)
        ));
        assert_eq!(contact_count(&conn), 1);
    }

    #[test]
    fn test_cache_is_scoped_by_company() {
        let conn = test_db();
        let mut resolver = resolver();
        let ours = stored(&conn, 1, &sample_fields());
        let theirs = stored(&conn, 2, &sample_fields());

        let a = resolver.resolve_or_create(&conn, &ours).unwrap();
        assert!(matches!(a, Resolution::Created(_)));
        // Company 2 sees company 1's contact through the exact lookup, not
        // the cache; the exact lookup prefers same-company contacts.
        let b = resolver.resolve_or_create(&conn, &theirs).unwrap();
        assert!(matches!(b, Resolution::Linked(_)));
        assert!(resolver.cache.contains_key(&(2, "998901234567".to_string())));
    }

    #[test]
    fn test_resolve_skips_linked_and_internal_calls() {
        let conn = test_db();
        let mut call = stored(&conn, 1, &sample_fields());
        call.contact_id = Some(42);
        assert_eq!(
            resolver().resolve_or_create(&conn, &call).unwrap(),
            Resolution::AlreadyLinked
        );

        let mut fields = sample_fields();
        fields.vendor_id = Some("v-int".to_string());
        fields.source_number = "101".to_string();
        let internal = stored(&conn, 1, &fields);
        assert_eq!(
            resolver().resolve_or_create(&conn, &internal).unwrap(),
            Resolution::NoCandidates
        );
        assert_eq!(contact_count(&conn), 0);
    }

    #[test]
    fn test_tail_search_rejects_lookalikes() {
        let conn = test_db();
        // Stored with a different prefix: shares the 7-digit tail only
        contacts::insert_contact(&conn, Some(1), "Lookalike", Some("998911234567"), None).unwrap();
        let call = stored(&conn, 1, &sample_fields());

        let found = resolver()
            .find_contact(&conn, 1, &["998901234567".to_string()])
            .unwrap();
        assert!(found.is_none());
        assert!(matches!(
            resolver().resolve_or_create(&conn, &call).unwrap(),
            Resolution::Created(_)
        ));
    }
}
