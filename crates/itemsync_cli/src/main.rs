//! `itemsync` command-line front-end.
//!
//! # Commands
//!
//! - `itemsync add <name>` - create an item
//! - `itemsync list [--offline]` - sync and print items, or print the cache
//! - `itemsync update <id> <name>` - rename an item
//! - `itemsync delete <id> [--yes]` - delete an item after confirmation
//! - `itemsync resync` - replace the cache with the full remote collection
//!
//! Configuration is read from `--config` (default `itemsync.toml`); a missing
//! file means defaults, but `remote.project_id` must be set.

mod exit_codes;

use chrono::{DateTime, SecondsFormat};
use clap::{Parser, Subcommand};
use exit_codes::codes;
use itemsync_core::config::CONFIG_FILE_NAME;
use itemsync_core::db::open_db;
use itemsync_core::{
    init_logging, FirestoreRestStore, Item, ItemService, ItemSyncConfig, LocalCache, RemoteStore,
    SqliteItemCache,
};
use log::warn;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Keep a list of named items in Firestore with a local offline cache.
#[derive(Debug, Parser)]
#[command(name = "itemsync", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add an item with the given name.
    Add { name: String },
    /// Sync with the remote store and list items.
    List {
        /// Print the local cache without contacting the remote store.
        #[arg(long)]
        offline: bool,
    },
    /// Rename an item.
    Update { id: String, name: String },
    /// Delete an item.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Replace the local cache with the full remote collection.
    Resync,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::from(codes::SUCCESS),
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}

struct Failure {
    code: u8,
    message: String,
}

impl Failure {
    fn new(code: u8, message: impl ToString) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

impl From<itemsync_core::ItemServiceError> for Failure {
    fn from(err: itemsync_core::ItemServiceError) -> Self {
        Self::new(exit_codes::for_service_error(&err), err)
    }
}

fn run(cli: Cli) -> Result<(), Failure> {
    let config = ItemSyncConfig::load_or_default(&cli.config)
        .map_err(|err| Failure::new(codes::VALIDATION_ERROR, err))?;

    if let Some(dir) = &config.logging.dir {
        if let Err(err) = init_logging(&config.logging.level, dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    config
        .validate()
        .map_err(|err| Failure::new(codes::VALIDATION_ERROR, err))?;

    if let Some(parent) = config
        .cache
        .path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent).map_err(|err| {
            Failure::new(
                codes::GENERIC_ERROR,
                format!("cannot create cache directory `{}`: {err}", parent.display()),
            )
        })?;
    }
    let conn = open_db(&config.cache.path).map_err(|err| Failure::new(codes::GENERIC_ERROR, err))?;
    let cache = SqliteItemCache::try_new(&conn).map_err(|err| Failure::new(codes::GENERIC_ERROR, err))?;
    let remote = FirestoreRestStore::new(config.firestore_settings())
        .map_err(|err| Failure::new(exit_codes::for_remote_error(&err), err))?;
    let service = ItemService::new(cache, remote).with_cursor_mode(config.sync.cursor_mode);

    execute(&service, cli.command)
}

fn execute<C: LocalCache, R: RemoteStore>(
    service: &ItemService<C, R>,
    command: Command,
) -> Result<(), Failure> {
    match command {
        Command::Add { name } => {
            let id = service.create_item(&name)?;
            println!("added {id}");
        }
        Command::List { offline } => {
            let items = if offline {
                service.cached_items()?
            } else {
                service.get_items()?
            };
            print_items(&items);
        }
        Command::Update { id, name } => {
            service.update_item(&id, &name)?;
            println!("updated {id}");
        }
        Command::Delete { id, yes } => {
            if !yes && !confirm("Are you sure you want to delete this item?") {
                println!("cancelled");
                return Ok(());
            }
            service.delete_item(&id)?;
            println!("deleted {id}");
        }
        Command::Resync => {
            let report = service.full_resync()?;
            print_items(&report.items);
            if report.removed > 0 {
                println!("removed {} stale cached item(s)", report.removed);
            }
        }
    }
    Ok(())
}

fn print_items(items: &[Item]) {
    if items.is_empty() {
        println!("No items available. Start adding items!");
        return;
    }
    for item in items {
        println!(
            "{}  {}  (Saved on: {})",
            item.id.as_deref().unwrap_or("-"),
            item.name,
            format_timestamp(item.timestamp)
        );
    }
}

fn format_timestamp(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// Asks a yes/no question on stdin; anything but `y`/`yes` declines.
fn confirm(question: &str) -> bool {
    print!("{question} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(err) => {
            warn!("event=confirm_prompt module=cli status=error error={err}");
            false
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
