//! stockfile - command-line front end for the inventory record store

use std::path::PathBuf;
use std::thread;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use stockfile_engine::RecordStore;

mod commands;
mod settings;

use commands::Command;
use settings::Settings;

/// Inventory record store over a flat file of fixed-size slots
#[derive(Parser, Debug)]
#[command(name = "stockfile")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data file (overrides the configuration file)
    #[arg(short, long)]
    data_file: Option<PathBuf>,

    /// Audit log (overrides the configuration file)
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Disable the audit trail
    #[arg(long, conflicts_with = "audit_log")]
    no_audit: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;

    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    if let Some(data_file) = args.data_file {
        settings.store.data_file = data_file;
    }
    if let Some(audit_log) = args.audit_log {
        settings.store.audit_log = Some(audit_log);
    }
    if args.no_audit {
        settings.store.audit_log = None;
    }

    // Set up logging; stdout carries command output, so logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&settings.log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("stockfile v{}", env!("CARGO_PKG_VERSION"));
    info!("Data file: {}", settings.store.data_file.display());

    let store = RecordStore::new(&settings.store);

    let mut events = store.subscribe();
    let watcher = thread::spawn(move || {
        while let Some(event) = events.blocking_recv() {
            debug!(?event, "store changed");
        }
    });

    let outcome = commands::run(&store, &settings.store, args.command);

    // Dropping the store closes the event channel and ends the watcher
    drop(store);
    let _ = watcher.join();

    outcome
}
