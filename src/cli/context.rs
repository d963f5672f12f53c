use crate::config::BusinessTz;
use crate::output::format::{detect_output_mode, OutputMode};

pub struct RunContext {
    pub output_mode: OutputMode,
    pub tz: BusinessTz,
}

impl RunContext {
    /// Create context from CLI arguments. Times display in `business_tz`
    /// unless `--utc` was given.
    pub fn from_args(json: bool, no_color: bool, utc: bool, business_tz: BusinessTz) -> Self {
        if no_color {
            colored::control::set_override(false);
        }

        let output_mode = detect_output_mode(json);
        let tz = if utc { BusinessTz::utc() } else { business_tz };

        RunContext { output_mode, tz }
    }
}
