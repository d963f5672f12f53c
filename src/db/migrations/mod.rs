//! Database migration system using rusqlite_migration.
//!
//! Migrations are embedded SQL files run in order to bring the database up to
//! the current schema version. `user_version` tracks what has been applied.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use rusqlite_migration::{Migrations, SchemaVersion, M};

/// Migration SQL, in order. Each entry brings the schema from version N to N+1.
const MIGRATIONS: &[&str] = &[include_str!("v001_initial_schema.sql")];

fn migrations() -> Migrations<'static> {
    Migrations::new(MIGRATIONS.iter().map(|sql| M::up(sql)).collect())
}

/// Open the database, running any pending migrations.
/// Backs up the database before applying migrations if it already exists.
pub fn open_and_migrate(db_path: &Path) -> Result<Connection> {
    let db_exists = db_path.exists();

    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    enable_foreign_keys(&conn)?;

    let m = migrations();
    let current_version = m
        .current_version(&conn)
        .context("Failed to check current schema version")?;

    let needs_migration = match current_version {
        SchemaVersion::NoneSet => true,
        SchemaVersion::Inside(v) => v.get() < MIGRATIONS.len(),
        SchemaVersion::Outside(_) => false,
    };

    if needs_migration && db_exists && !matches!(current_version, SchemaVersion::NoneSet) {
        backup_database(db_path)?;
        eprintln!("[callsync] Applying database migration(s)...");
    } else if needs_migration && !db_exists {
        eprintln!("[callsync] Creating new database at {}", db_path.display());
    }

    m.to_latest(&mut conn)
        .context("Failed to apply database migrations")?;

    Ok(conn)
}

/// Open a fresh in-memory database with the full schema.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    enable_foreign_keys(&conn)?;
    migrations()
        .to_latest(&mut conn)
        .context("Failed to apply database migrations")?;
    Ok(conn)
}

fn enable_foreign_keys(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("Failed to enable foreign keys")
}

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> Result<usize> {
    let version = migrations()
        .current_version(conn)
        .context("Failed to get schema version")?;

    Ok(match version {
        SchemaVersion::NoneSet => 0,
        SchemaVersion::Inside(v) => v.get(),
        SchemaVersion::Outside(v) => v.get(),
    })
}

/// Create a backup of the database file before migrations.
fn backup_database(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        return Ok(());
    }

    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let backup_path = db_path.with_extension(format!("db.backup.{}", timestamp));

    std::fs::copy(db_path, &backup_path)
        .with_context(|| format!("Failed to backup database to {}", backup_path.display()))?;

    eprintln!("[callsync] Backed up database to {}", backup_path.display());
    Ok(())
}
