use anyhow::{bail, Result};
use rusqlite::Connection;

use crate::cli::args::UsersAction;
use crate::db::users;
use crate::output::format::OutputMode;
use crate::output::json::to_json;
use crate::output::table::{format_notification_row, format_user_row};

pub fn run(
    conn: &mut Connection,
    action: &UsersAction,
    default_company: i64,
    mode: OutputMode,
) -> Result<()> {
    match action {
        UsersAction::Add {
            name,
            company,
            external,
            groups,
        } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("User name must not be empty");
            }
            let company_id = company.unwrap_or(default_company);
            let id = users::add_user(conn, name, company_id, *external, groups)?;
            match mode {
                OutputMode::Json => println!(
                    "{}",
                    to_json(&serde_json::json!({"action": "add_user", "id": id}))
                ),
                OutputMode::Tty => println!("Added user {} ({}).", id, name),
            }
            Ok(())
        }
        UsersAction::List => list(conn, mode),
        UsersAction::Notifications { id } => notifications(conn, *id, mode),
    }
}

fn list(conn: &Connection, mode: OutputMode) -> Result<()> {
    let all = users::list_users(conn)?;

    match mode {
        OutputMode::Json => println!("{}", to_json(&all)),
        OutputMode::Tty => {
            if all.is_empty() {
                println!("No users found.");
                return Ok(());
            }
            for user in &all {
                let groups = users::user_groups(conn, user.id)?;
                println!("{}", format_user_row(user, &groups));
            }
        }
    }
    Ok(())
}

fn notifications(conn: &Connection, user_id: i64, mode: OutputMode) -> Result<()> {
    if users::get_user(conn, user_id)?.is_none() {
        bail!("User {} not found", user_id);
    }
    let inbox = users::list_notifications(conn, user_id)?;

    match mode {
        OutputMode::Json => println!("{}", to_json(&inbox)),
        OutputMode::Tty => {
            if inbox.is_empty() {
                println!("No notifications.");
                return Ok(());
            }
            for n in &inbox {
                println!("{}", format_notification_row(n));
            }
        }
    }
    Ok(())
}
