use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::cli::args::ConfigAction;
use crate::config::Settings;
use crate::output::format::OutputMode;
use crate::output::json::to_json;

pub fn run(action: &ConfigAction, path: &Path, mode: OutputMode) -> Result<()> {
    match action {
        ConfigAction::Show => show(path, mode),
        ConfigAction::Set { key, value } => set(path, key, value),
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn show(path: &Path, mode: OutputMode) -> Result<()> {
    let settings = Settings::load_from(path)?;
    let pairs = settings.display_pairs();

    match mode {
        OutputMode::Json => {
            let map: serde_json::Map<String, serde_json::Value> = pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
                .collect();
            println!("{}", to_json(&map));
        }
        OutputMode::Tty => {
            for (key, value) in pairs {
                let shown = if value.is_empty() {
                    "(unset)".dimmed().to_string()
                } else {
                    value
                };
                println!("{:<20} {}", key.bold(), shown);
            }
        }
    }
    Ok(())
}

fn set(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load_from(path)?;
    settings.set(key, value)?;
    settings.save_to(path)?;
    eprintln!("[callsync] Saved {} to {}", key, path.display());
    Ok(())
}
