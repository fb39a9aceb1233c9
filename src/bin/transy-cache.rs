//! Maintenance CLI for the translation cache directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use transy_cache::{derive_key, telemetry, CacheConfig, CacheKey, Store};

#[derive(Debug, Parser)]
#[command(name = "transy-cache", version, about = "Inspect and maintain the translation cache")]
struct Cli {
    /// Cache directory (defaults to TRANSY_CACHE_DIR or the platform config dir).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the cache key for a request.
    Key {
        provider: String,
        model: String,
        source_lang: String,
        target_lang: String,
        text: String,
    },
    /// Print the number of live entries.
    Stats,
    /// Print a cached entry as JSON.
    Get { key: String },
    /// Remove a cached entry.
    Evict { key: String },
    /// Run one reclamation pass.
    Reclaim,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.json_logs);

    if let Command::Key {
        provider,
        model,
        source_lang,
        target_lang,
        text,
    } = &cli.command
    {
        println!("{}", derive_key(provider, model, source_lang, target_lang, text));
        return ExitCode::SUCCESS;
    }

    let mut config = CacheConfig::from_env();
    if let Some(dir) = cli.dir {
        config.dir = dir;
    }

    let store = match Store::open_with(&config.dir, config.store_config()) {
        Ok(store) => store,
        Err(e) => {
            error!(dir = %config.dir.display(), error = %e, "failed to open cache");
            return ExitCode::FAILURE;
        }
    };

    let code = run(&store, cli.command);
    if let Err(e) = store.close() {
        error!(error = %e, "failed to close cache");
        return ExitCode::FAILURE;
    }
    code
}

fn run(store: &Store, command: Command) -> ExitCode {
    match command {
        Command::Key { .. } => ExitCode::SUCCESS,
        Command::Stats => match store.len() {
            Ok(len) => {
                println!("dir: {}", store.dir().display());
                println!("live entries: {len}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "failed to count entries");
                ExitCode::FAILURE
            }
        },
        Command::Get { key } => {
            let Some(key) = parse_key(&key) else {
                return ExitCode::FAILURE;
            };
            match store.get(&key) {
                Some(entry) => match serde_json::to_string_pretty(&entry) {
                    Ok(json) => {
                        println!("{json}");
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        error!(error = %e, "failed to render entry");
                        ExitCode::FAILURE
                    }
                },
                None => {
                    eprintln!("not found: {key}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Evict { key } => {
            let Some(key) = parse_key(&key) else {
                return ExitCode::FAILURE;
            };
            match store.evict(&key) {
                Ok(true) => {
                    println!("evicted {key}");
                    ExitCode::SUCCESS
                }
                Ok(false) => {
                    eprintln!("not found: {key}");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!(error = %e, "evict failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Reclaim => match store.reclaim_now() {
            Ok(report) => {
                println!(
                    "expired removed: {}, pages freed: {}",
                    report.expired_removed, report.pages_freed
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "reclamation failed");
                ExitCode::FAILURE
            }
        },
    }
}

fn parse_key(raw: &str) -> Option<CacheKey> {
    let key = CacheKey::from_hex(raw.trim());
    if key.is_none() {
        eprintln!("invalid cache key (expected 64 hex digits): {raw}");
    }
    key
}
