use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal};

use crate::sync::SyncPhase;

/// Create a spinner for indeterminate-progress operations (e.g., waiting for an API response).
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("[callsync] {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn phase_message(phase: SyncPhase) -> Option<String> {
    match phase {
        SyncPhase::Fetching(page) => Some(format!("Fetching page {}...", page)),
        SyncPhase::Processing(page) => Some(format!("Saving page {}...", page)),
        SyncPhase::Notifying => Some("Sending notifications...".to_string()),
        SyncPhase::Idle => None,
    }
}

/// Spinner that follows sync phases when stderr is a TTY, and stays
/// silent otherwise.
pub struct SyncProgress {
    spinner: Option<ProgressBar>,
}

impl SyncProgress {
    pub fn new() -> Self {
        let spinner = io::stderr()
            .is_terminal()
            .then(|| create_spinner("Starting sync..."));
        Self { spinner }
    }

    pub fn update(&self, phase: SyncPhase) {
        let Some(pb) = &self.spinner else {
            return;
        };
        match phase_message(phase) {
            Some(msg) => pb.set_message(msg),
            None => pb.finish_and_clear(),
        }
    }

    /// Finish and clear the spinner.
    pub fn finish(&self) {
        if let Some(ref pb) = self.spinner {
            pb.finish_and_clear();
        }
    }
}
