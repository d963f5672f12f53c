use clap::{Parser, Subcommand};

use crate::models::Direction;

fn parse_direction(s: &str) -> Result<Direction, String> {
    s.to_lowercase().parse()
}

#[derive(Parser, Debug)]
#[command(name = "callsync", version = env!("CALLSYNC_VERSION"), about = "Sync telephony call history into a local database")]
pub struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output (uses human-readable format without ANSI codes)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Display timestamps in UTC instead of the business timezone
    #[arg(long, global = true)]
    pub utc: bool,

    /// Use a specific database file instead of the default
    #[arg(long, global = true)]
    pub db: Option<std::path::PathBuf>,

    /// Use a specific config file instead of the default
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Enable verbose output for debugging API calls, sync operations, and errors
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch recent call history from the vendor
    Sync {
        /// Maximum number of pages to fetch [default: 5, or 2 with --auto]
        #[arg(long)]
        pages: Option<u32>,

        /// Scheduled run: small page limit, no spinner
        #[arg(long)]
        auto: bool,
    },

    /// Check that the vendor API is reachable with the configured token
    TestConnection,

    /// View or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Browse and manage synced calls
    Calls {
        #[command(subcommand)]
        action: CallsAction,
    },

    /// Browse contacts
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },

    /// Manage users who receive notifications
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Run the webhook receiver, recording proxy and click-to-call pages
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on
        #[arg(long, short, default_value = "8070")]
        port: u16,

        /// Also sync from the vendor every N minutes
        #[arg(long)]
        poll_minutes: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print all settings (secrets masked)
    Show,

    /// Set one setting; lists are comma-separated
    Set { key: String, value: String },

    /// Print the config file location
    Path,
}

#[derive(Subcommand, Debug)]
pub enum CallsAction {
    /// List calls, newest first
    #[command(visible_alias = "ls")]
    List {
        /// Maximum number of calls to show (0 = no limit)
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Only calls in this direction [in, out, missed, other]
        #[arg(long, value_parser = parse_direction)]
        direction: Option<Direction>,

        /// Only calls that have a recording
        #[arg(long)]
        with_recording: bool,

        /// Only calls linked to this contact id
        #[arg(long)]
        contact: Option<i64>,
    },

    /// Show one call
    Show { id: i64 },

    /// Delete calls by id
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Print the player page URL for a call's recording
    Play {
        id: i64,

        /// Base URL where `callsync serve` is reachable
        #[arg(long, default_value = "http://127.0.0.1:8070")]
        server: String,
    },

    /// Print a call's recording download URL
    Download { id: i64 },

    /// Notify a user about calls created since their last visit
    Unseen {
        #[arg(long)]
        user: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContactsAction {
    /// List contacts
    #[command(visible_alias = "ls")]
    List {
        /// Filter by name or number fragment
        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsersAction {
    /// Add a user
    Add {
        name: String,

        /// Company the user belongs to [default: the configured company_id]
        #[arg(long)]
        company: Option<i64>,

        /// Portal/external user (never targeted by fallback broadcasts)
        #[arg(long)]
        external: bool,

        /// Group membership (repeatable)
        #[arg(long = "group")]
        groups: Vec<String>,
    },

    /// List users
    #[command(visible_alias = "ls")]
    List,

    /// Show a user's notifications
    Notifications { id: i64 },
}
