use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::warn;
use rusqlite::Connection;

use crate::config::Settings;
use crate::server::{serve, AppState};

pub fn run(
    conn: Connection,
    settings: Settings,
    bind: &str,
    port: u16,
    poll_minutes: Option<u64>,
) -> Result<()> {
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind))?;
    let addr = SocketAddr::new(ip, port);

    let poll = match poll_minutes {
        Some(0) => bail!("--poll-minutes must be at least 1"),
        Some(m) => {
            settings.connection()?;
            Some(Duration::from_secs(m * 60))
        }
        None => None,
    };
    if settings.webhook_secret.is_none() {
        warn!("webhook_secret is not set; every webhook request will be rejected");
        eprintln!("[callsync] Warning: webhook_secret is not set, /webhooks/call will reject all requests");
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(serve(AppState::new(conn, settings), addr, poll))
}
