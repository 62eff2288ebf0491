//! Relocator CLI - copy, move and delete files between a local backend and storage

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use relocator::{Outcome, Relocator, RelocatorConfig};

/// CLI command
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Copy a file into storage, keeping the local copy
    Copy { path: String },
    /// Move a file into storage
    Move { path: String },
    /// Delete a file from storage
    Delete { path: String },
    /// List the directory of a path on storage
    Refresh { path: String },
    /// Show help
    Help,
}

#[derive(Debug)]
struct Invocation {
    config: Option<PathBuf>,
    command: Command,
}

fn print_help() {
    eprintln!(
        r#"Relocator - move files from a local backend into storage

USAGE:
    relocator [--config <file>] copy <path>
    relocator [--config <file>] move <path>
    relocator [--config <file>] delete <path>
    relocator [--config <file>] refresh <path>
    relocator help

COMMANDS:
    copy     Copy <path> from the local backend to storage, replacing any existing file
    move     Same as copy, then remove the local file
    delete   Remove <path> from storage (absent files are not an error)
    refresh  List the directory containing <path> on storage
    help     Show this help message

ENVIRONMENT:
    RELOCATOR_CONFIG Config file (when --config is not given)
    B2_KEY_ID        B2 application key ID (when the config omits it)
    B2_KEY           B2 application key (when the config omits it)
    RUST_LOG         Log level (trace, debug, info, warn, error)

EXIT STATUS:
    0 success, 1 operation failed, 2 configuration or usage error
"#
    );
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut config = None;
    let mut rest = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file argument"))?;
                config = Some(PathBuf::from(path));
            }
            _ => rest.push(arg.as_str()),
        }
    }

    let command = match rest.as_slice() {
        [] | ["help"] | ["--help"] | ["-h"] => Command::Help,
        ["copy", path] => Command::Copy { path: path.to_string() },
        ["move", path] => Command::Move { path: path.to_string() },
        ["delete", path] => Command::Delete { path: path.to_string() },
        ["refresh", path] => Command::Refresh { path: path.to_string() },
        [name @ ("copy" | "move" | "delete" | "refresh"), ..] => {
            return Err(anyhow!("Usage: relocator {} <path>", name));
        }
        [other, ..] => return Err(anyhow!("Unknown command: {}", other)),
    };

    Ok(Invocation { config, command })
}

fn load_config(explicit: Option<PathBuf>) -> Result<RelocatorConfig> {
    let path = RelocatorConfig::locate(explicit)?;
    RelocatorConfig::load(&path).with_context(|| format!("Loading {}", path.display()))
}

fn report(operation: &str, path: &str, outcome: &Outcome) -> bool {
    match outcome {
        Outcome::Completed => {
            println!("{} {}: ok", operation, path);
        }
        Outcome::TransferFailed(e) => {
            println!("{} {}: failed ({})", operation, path, e);
        }
        Outcome::NotifyFailed(e) => {
            println!("{} {}: done, cache refresh failed ({})", operation, path, e);
        }
        Outcome::SourceNotRemoved(e) => {
            println!("{} {}: copied, local file not removed ({})", operation, path, e);
        }
    }
    outcome.succeeded()
}

async fn run(relocator: &Relocator, command: Command) -> Result<bool> {
    let succeeded = match command {
        Command::Copy { path } => {
            let outcome = relocator.copy_to_storage_outcome(&path).await?;
            report("copy", &path, &outcome)
        }
        Command::Move { path } => {
            let outcome = relocator.move_to_storage_outcome(&path).await?;
            report("move", &path, &outcome)
        }
        Command::Delete { path } => {
            let outcome = relocator.delete_from_storage_outcome(&path).await?;
            report("delete", &path, &outcome)
        }
        Command::Refresh { path } => {
            let refreshed = relocator.refresh_cache(&path).await?;
            println!("refresh {}: {}", path, if refreshed { "ok" } else { "failed" });
            refreshed
        }
        Command::Help => {
            print_help();
            true
        }
    };
    Ok(succeeded)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = env::args().collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            return Ok(ExitCode::from(2));
        }
    };

    if invocation.command == Command::Help {
        print_help();
        return Ok(ExitCode::SUCCESS);
    }

    let config = match load_config(invocation.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Invalid configuration");
            return Ok(ExitCode::from(2));
        }
    };

    let relocator = Relocator::from_config(&config);
    info!(
        local = relocator.local_backend(),
        storage = relocator.storage_backend(),
        "Backends configured"
    );

    match run(&relocator, invocation.command).await {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::from(1)),
        Err(e) => {
            error!(error = %e, "Failed to resolve backends");
            Ok(ExitCode::from(2))
        }
    }
}
