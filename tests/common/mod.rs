#![allow(dead_code)]

use std::path::PathBuf;

use assert_cmd::Command;
use rusqlite::{params, Connection};
use tempfile::TempDir;

/// A self-contained test environment with its own data directory, so the
/// database and config.toml never touch the real user's files.
pub struct TestEnv {
    pub dir: TempDir,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnv {
    /// Empty data directory; the binary creates the database on first use.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data").join("callsync");
        std::fs::create_dir_all(&data_dir).unwrap();
        let db_path = data_dir.join("callsync.db");
        let config_path = data_dir.join("config.toml");

        TestEnv {
            dir,
            data_dir,
            db_path,
            config_path,
        }
    }

    /// Environment whose database already holds a few calls, one contact
    /// and one user.
    pub fn with_fixture() -> Self {
        let env = Self::new();
        // Let the binary create and migrate the schema.
        env.cmd().args(["users", "list"]).assert().success();

        let conn = Connection::open(&env.db_path).unwrap();
        insert_fixture(&conn);
        env
    }

    /// Get a Command configured to run callsync with this environment.
    pub fn cmd(&self) -> Command {
        let mut cmd = assert_cmd::cargo_bin_cmd!("callsync");
        cmd.env("XDG_DATA_HOME", self.dir.path().join("data"));
        cmd.env_remove("CALLSYNC_LOG");
        // Ensure no color codes pollute test output
        cmd.env("NO_COLOR", "1");
        cmd
    }

    /// Get a Command with --json flag.
    pub fn cmd_json(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("--json");
        cmd
    }

    pub fn conn(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }
}

fn insert_fixture(conn: &Connection) {
    conn.execute(
        "INSERT INTO contacts (id, company_id, name, phone, phone_digits)
         VALUES (1, 1, 'Dilnoza Karimova', '+998901234567', '998901234567')",
        [],
    )
    .unwrap();

    let calls: &[(i64, &str, &str, &str, &str, &str, i64, &str, Option<i64>)] = &[
        (
            1,
            "v-1",
            "2025-06-10 09:00:05",
            "in",
            "+998901234567",
            "101",
            125,
            "https://rec.example/1.mp3",
            Some(1),
        ),
        (
            2,
            "v-2",
            "2025-06-10 10:30:00",
            "out",
            "102",
            "+998935551122",
            40,
            "",
            None,
        ),
        (
            3,
            "v-3",
            "2025-06-11 08:15:00",
            "missed",
            "+998712223344",
            "101",
            0,
            "",
            None,
        ),
    ];

    for (id, vendor_id, at, direction, src, dst, talk, play, contact) in calls {
        let fingerprint = format!("{}|{}|{}|{}|", direction, at, src, dst);
        conn.execute(
            "INSERT INTO calls (id, company_id, vendor_id, fingerprint, occurred_at, direction,
                                source_number, destination_number, source_digits, destination_digits,
                                talk_seconds, status, play_url, download_url, has_recording, contact_id)
             VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'ANSWERED', ?11, ?11, ?12, ?13)",
            params![
                id,
                vendor_id,
                fingerprint,
                at,
                direction,
                src,
                dst,
                digits(src),
                digits(dst),
                talk,
                play,
                !play.is_empty(),
                contact,
            ],
        )
        .unwrap();
    }

    conn.execute(
        "INSERT INTO users (id, name, company_id, last_seen_at) VALUES (1, 'Aziz', 1, '2025-01-01 00:00:00')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO user_groups (group_name, user_id) VALUES ('sales', 1)",
        [],
    )
    .unwrap();
}

fn digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}
