use anyhow::Result;
use rusqlite::Connection;

use crate::cli::args::ContactsAction;
use crate::output::format::OutputMode;

pub fn run(conn: &Connection, action: &ContactsAction, mode: OutputMode) -> Result<()> {
    match action {
        ContactsAction::List { search } => list(conn, search.as_deref(), mode),
    }
}

pub fn list(conn: &Connection, search: Option<&str>, mode: OutputMode) -> Result<()> {
    let contacts = crate::db::contacts::list_contacts(conn, search)?;

    match mode {
        OutputMode::Json => {
            println!("{}", crate::output::json::to_json(&contacts));
        }
        OutputMode::Tty => {
            if contacts.is_empty() {
                println!("No contacts found.");
                return Ok(());
            }
            for contact in &contacts {
                println!("{}", crate::output::table::format_contact_row(contact));
            }
        }
    }

    Ok(())
}
