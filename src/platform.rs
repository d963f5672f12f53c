use std::env;
use std::path::PathBuf;

use anyhow::{bail, Result};

fn dirs_home() -> Option<PathBuf> {
    env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| env::var("USERPROFILE").ok().map(PathBuf::from))
}

/// Get the data directory for callsync (database and settings)
pub fn data_dir() -> Result<PathBuf> {
    let dir = if let Ok(xdg) = env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join("callsync")
    } else if let Some(home) = dirs_home() {
        if cfg!(target_os = "macos") {
            home.join("Library").join("Application Support").join("callsync")
        } else {
            home.join(".local").join("share").join("callsync")
        }
    } else {
        bail!("Cannot determine data directory");
    };

    Ok(dir)
}
