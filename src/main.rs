mod api;
mod cli;
mod commands;
mod config;
mod db;
mod models;
mod notify;
mod output;
mod phone;
mod platform;
mod resolver;
mod server;
mod sync;
mod upsert;
mod webhook;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use rusqlite::Connection;

use cli::args::{Cli, Commands};
use cli::context::RunContext;
use config::Settings;

fn main() -> Result<()> {
    setup_broken_pipe_handling();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    let settings = Settings::load_from(&config_path)?;
    let ctx = RunContext::from_args(cli.json, cli.no_color, cli.utc, settings.tz());

    // Config and connection test don't need a database
    match &cli.command {
        Commands::Config { action } => {
            return commands::config::run(action, &config_path, ctx.output_mode);
        }
        Commands::TestConnection => {
            return commands::sync::test_connection(&settings, ctx.output_mode);
        }
        _ => {}
    }

    let mut conn = get_connection(cli.db.as_deref())?;

    match &cli.command {
        Commands::Sync { pages, auto } => {
            commands::sync::run(&conn, &settings, *pages, *auto, ctx.output_mode)?;
        }

        Commands::Calls { action } => {
            commands::calls::run(&conn, action, settings.company_id, &ctx)?;
        }

        Commands::Contacts { action } => {
            commands::contacts::run(&conn, action, ctx.output_mode)?;
        }

        Commands::Users { action } => {
            let company = settings.company_id;
            commands::users::run(&mut conn, action, company, ctx.output_mode)?;
        }

        Commands::Serve {
            bind,
            port,
            poll_minutes,
        } => {
            commands::serve::run(conn, settings, bind, *port, *poll_minutes)?;
        }

        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::TestConnection => unreachable!(), // Handled above
    }

    Ok(())
}

/// Initialize logging based on the `--verbose` flag or `CALLSYNC_LOG` env var.
///
/// - `CALLSYNC_LOG` env var: full filter control (e.g. `CALLSYNC_LOG=callsync::api=trace`)
/// - `--verbose`: sets `callsync` crate to `Debug` level
/// - Otherwise: `Warn` level only
fn init_logging(verbose: bool) {
    let env_var = std::env::var("CALLSYNC_LOG").ok();

    let mut builder = env_logger::Builder::new();
    builder.format_target(true);
    builder.format_module_path(false);

    if let Some(ref filter) = env_var {
        builder.parse_filters(filter);
    } else if verbose {
        builder.filter_module("callsync", log::LevelFilter::Debug);
        builder.filter_module("tower_http", log::LevelFilter::Debug);
    } else {
        builder.filter_level(log::LevelFilter::Warn);
    }

    builder.init();
}

/// Handle broken pipe gracefully instead of panicking.
///
/// `callsync calls list --json | head -1` would otherwise panic in `println!`
/// once the reader exits, because the runtime ignores SIGPIPE.
fn setup_broken_pipe_handling() {
    #[cfg(unix)]
    unsafe {
        // SIGPIPE = 13, SIG_DFL = 0
        unsafe extern "C" {
            fn signal(sig: i32, handler: usize) -> usize;
        }
        signal(13, 0);
    }

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info
            .payload()
            .downcast_ref::<String>()
            .map(|s| s.as_str())
            .or_else(|| info.payload().downcast_ref::<&str>().copied())
            .unwrap_or("");

        if msg.contains("failed printing to stdout") {
            std::process::exit(0);
        }

        default_hook(info);
    }));
}

/// Get a database connection, optionally at a specific path
fn get_connection(db_path: Option<&Path>) -> Result<Connection> {
    match db_path {
        Some(path) => db::connection::open_db_at_path(path),
        None => db::connection::open_or_create_db(),
    }
}
