//! Integration settings.
//!
//! Stored as TOML in `~/.local/share/callsync/config.toml` (or the path given
//! with `--config`). Every component reads from [`Settings`]; the only write
//! path is `callsync config set`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phone::digits_only;
use crate::platform::data_dir;

const DEFAULT_PER_PAGE: u32 = 50;
const DEFAULT_LOOKBACK_DAYS: u32 = 3;
const DEFAULT_TIMEZONE: &str = "Asia/Tashkent";
const MAX_LOOKBACK_DAYS: u32 = 3650;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Vendor base URL and API token are not configured. Run 'callsync config set base_url <url>' and 'callsync config set token <token>'.")]
    MissingConnection,

    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Unknown setting '{0}'. Known settings: {keys}", keys = KEYS.join(", "))]
    UnknownKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// All settings keys accepted by `config set`.
pub const KEYS: &[&str] = &[
    "base_url",
    "token",
    "per_page",
    "lookback_days",
    "timezone",
    "internal_extensions",
    "did_numbers",
    "notify_enabled",
    "notify_group",
    "webhook_secret",
    "company_id",
];

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    /// Vendor API root, without trailing slash
    pub base_url: Option<String>,

    /// Sent verbatim as the `Authorization` header (include any scheme prefix)
    pub token: Option<String>,

    pub per_page: u32,

    /// Sync window size in days
    pub lookback_days: u32,

    /// Business timezone: an IANA name like `Asia/Tashkent`, or an offset like `+05:00`
    pub timezone: String,

    pub internal_extensions: Vec<String>,

    /// Numbers the tenant owns
    pub did_numbers: Vec<String>,

    pub notify_enabled: bool,

    /// Group whose members receive "new calls" notifications
    pub notify_group: Option<String>,

    /// Shared secret for the inbound webhook; unset rejects every request
    pub webhook_secret: Option<String>,

    /// Tenant scope records are synced into
    pub company_id: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            per_page: DEFAULT_PER_PAGE,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            timezone: DEFAULT_TIMEZONE.to_string(),
            internal_extensions: Vec::new(),
            did_numbers: Vec::new(),
            notify_enabled: true,
            notify_group: None,
            webhook_secret: None,
            company_id: 1,
        }
    }
}

/// Vendor connection parameters, present only when fully configured.
#[derive(Debug, Clone)]
pub struct Connection {
    pub base_url: String,
    pub token: String,
    pub per_page: u32,
}

impl Settings {
    /// Load settings from `path`, returning defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save settings to `path` with restrictive permissions.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        // Write to temp file first for atomic operation
        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, &content)?;

        // Token and webhook secret live here: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&temp_path, perms)?;
        }

        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Apply one `key = value` assignment from the settings-save path.
    pub fn set(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let value = value.trim();
        match key {
            "base_url" => {
                self.base_url = match non_empty(value) {
                    Some(v) => {
                        url::Url::parse(v).map_err(|e| invalid(key, e.to_string()))?;
                        Some(v.trim_end_matches('/').to_string())
                    }
                    None => None,
                };
            }
            "token" => self.token = non_empty(value).map(str::to_string),
            "per_page" => {
                let n: u32 = value.parse().map_err(|_| invalid(key, "expected a positive integer"))?;
                if n == 0 {
                    return Err(invalid(key, "must be at least 1"));
                }
                self.per_page = n;
            }
            "lookback_days" => {
                let days: u32 = value.parse().map_err(|_| invalid(key, "expected a positive integer"))?;
                if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
                    return Err(invalid(key, format!("must be between 1 and {}", MAX_LOOKBACK_DAYS)));
                }
                self.lookback_days = days;
            }
            "timezone" => {
                BusinessTz::parse(value)
                    .ok_or_else(|| invalid(key, "expected a zone name like Asia/Tashkent or an offset like +05:00"))?;
                self.timezone = value.to_string();
            }
            "internal_extensions" => self.internal_extensions = split_list(value),
            "did_numbers" => self.did_numbers = split_list(value),
            "notify_enabled" => self.notify_enabled = parse_bool(value).ok_or_else(|| invalid(key, "expected true or false"))?,
            "notify_group" => self.notify_group = non_empty(value).map(str::to_string),
            "webhook_secret" => self.webhook_secret = non_empty(value).map(str::to_string),
            "company_id" => {
                self.company_id = value.parse().map_err(|_| invalid(key, "expected an integer id"))?;
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Vendor connection parameters, or [`ConfigError::MissingConnection`].
    pub fn connection(&self) -> ConfigResult<Connection> {
        let base_url = self
            .base_url
            .as_deref()
            .map(|b| b.trim().trim_end_matches('/'))
            .filter(|b| !b.is_empty());
        let token = self.token.as_deref().map(str::trim).filter(|t| !t.is_empty());

        match (base_url, token) {
            (Some(base_url), Some(token)) => Ok(Connection {
                base_url: base_url.to_string(),
                token: token.to_string(),
                per_page: self.per_page.max(1),
            }),
            _ => Err(ConfigError::MissingConnection),
        }
    }

    /// Business timezone. Falls back to the default zone if the stored
    /// value is unparseable.
    pub fn tz(&self) -> BusinessTz {
        BusinessTz::parse(&self.timezone).unwrap_or_else(|| {
            warn!("Unparseable timezone '{}', using {}", self.timezone, DEFAULT_TIMEZONE);
            BusinessTz::parse(DEFAULT_TIMEZONE).unwrap_or_else(BusinessTz::utc)
        })
    }

    /// Digit forms of the configured DIDs.
    pub fn did_digits(&self) -> HashSet<String> {
        self.did_numbers
            .iter()
            .map(|d| digits_only(d))
            .filter(|d| !d.is_empty())
            .collect()
    }

    /// Digit forms of the configured internal extensions.
    pub fn extension_digits(&self) -> HashSet<String> {
        self.internal_extensions
            .iter()
            .map(|e| digits_only(e))
            .filter(|e| !e.is_empty())
            .collect()
    }

    /// Masked rendering of every key for `config show`.
    pub fn display_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("base_url", self.base_url.clone().unwrap_or_default()),
            ("token", mask(self.token.as_deref())),
            ("per_page", self.per_page.to_string()),
            ("lookback_days", self.lookback_days.to_string()),
            ("timezone", self.timezone.clone()),
            ("internal_extensions", self.internal_extensions.join(",")),
            ("did_numbers", self.did_numbers.join(",")),
            ("notify_enabled", self.notify_enabled.to_string()),
            ("notify_group", self.notify_group.clone().unwrap_or_default()),
            ("webhook_secret", mask(self.webhook_secret.as_deref())),
            ("company_id", self.company_id.to_string()),
        ]
    }
}

/// Get the path to the default config file.
pub fn config_path() -> ConfigResult<PathBuf> {
    let dir = data_dir().map_err(|e| ConfigError::Read(e.to_string()))?;
    Ok(dir.join("config.toml"))
}

/// Zone that naive vendor timestamps and displayed times are read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessTz {
    Named(Tz),
    Fixed(FixedOffset),
}

impl BusinessTz {
    pub fn utc() -> Self {
        BusinessTz::Fixed(Utc.fix())
    }

    /// An IANA zone name (`Asia/Tashkent`, `UTC`) or a UTC offset (`+05:00`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(tz) = s.parse::<Tz>() {
            return Some(BusinessTz::Named(tz));
        }
        s.parse::<FixedOffset>().ok().map(BusinessTz::Fixed)
    }

    /// Offset in effect at `instant`.
    pub fn offset_at(&self, instant: &DateTime<Utc>) -> FixedOffset {
        match self {
            BusinessTz::Named(tz) => tz.offset_from_utc_datetime(&instant.naive_utc()).fix(),
            BusinessTz::Fixed(offset) => *offset,
        }
    }

    pub fn to_local(&self, instant: &DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset_at(instant))
    }

    /// Read `naive` as wall time in this zone.
    ///
    /// A repeated hour resolves to its earlier instant. A wall time skipped
    /// by a DST jump is read with the offset from the day before.
    pub fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        let resolved = match self {
            BusinessTz::Named(tz) => tz.from_local_datetime(naive).earliest().map(|dt| dt.with_timezone(&Utc)),
            BusinessTz::Fixed(offset) => offset.from_local_datetime(naive).earliest().map(|dt| dt.with_timezone(&Utc)),
        };
        resolved.or_else(|| {
            let day_before = Utc.from_utc_datetime(naive).checked_sub_signed(Duration::days(1))?;
            let offset = self.offset_at(&day_before);
            let utc = naive.checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))?;
            Some(Utc.from_utc_datetime(&utc))
        })
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        None => String::new(),
        Some(s) => {
            let chars: Vec<char> = s.chars().collect();
            if chars.len() <= 4 {
                "****".to_string()
            } else {
                let last: String = chars[chars.len() - 4..].iter().collect();
                format!("****{}", last)
            }
        }
    }
}
