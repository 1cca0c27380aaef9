//! Kestrel CLI - binary entry point.
//!
//! ```text
//! kestrel toolchain          print the discovered toolchain as JSON
//! kestrel serve              speak the host protocol on stdin/stdout
//! kestrel match < build.log  print compiler diagnostics found in a build log
//! ```
//!
//! Logs never go to stdout: `serve` uses it for host messages.

use std::fs::{self, OpenOptions};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kestrel_engine::{
    Extension, HostEvent, HostMessage, ToolchainLocator, match_output, read_configuration,
    read_configuration_from,
};

/// How often the language client is polled while serving.
const TICK: Duration = Duration::from_millis(25);

#[derive(Parser)]
#[command(
    name = "kestrel",
    version,
    about = "Swift toolchain discovery and sourcekit-lsp lifecycle for editor hosts"
)]
struct Cli {
    /// Configuration file. Defaults to ~/.kestrel/config.toml
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate the toolchain and print it as JSON
    Toolchain,
    /// Read host events from stdin and write host messages to stdout
    Serve,
    /// Match compiler diagnostics in a build log read from stdin
    Match,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than corrupt the host protocol.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.kestrel/logs/kestrel.log
    if let Some(config_path) = kestrel_config::config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("kestrel.log"));
    }

    // Fallback: ./.kestrel/logs/kestrel.log
    candidates.push(PathBuf::from(".kestrel").join("logs").join("kestrel.log"));

    candidates
}

async fn print_toolchain(config: Option<PathBuf>) -> Result<()> {
    let snapshot = config.as_deref().map_or_else(read_configuration, read_configuration_from);
    let toolchain = ToolchainLocator::new(&snapshot)
        .locate()
        .await
        .context("toolchain discovery failed")?;
    println!("{}", serde_json::to_string_pretty(&toolchain)?);
    Ok(())
}

fn print_matches() -> Result<()> {
    let mut log = String::new();
    std::io::stdin()
        .read_to_string(&mut log)
        .context("reading build log from stdin")?;
    let found = match_output(&log);
    tracing::debug!(count = found.len(), "Compiler diagnostics matched");
    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}

async fn write_message(out: &mut Stdout, message: &HostMessage) -> Result<()> {
    let mut line = message.to_line().context("serializing host message")?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn serve(config: Option<PathBuf>) -> Result<()> {
    let mut extension = Extension::activate(config)
        .await
        .context("activation failed")?;
    let mut out = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading host events")? else {
                    tracing::info!("Host closed stdin");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match HostEvent::parse(&line) {
                    Ok(event) => extension.handle_event(event).await,
                    Err(e) => {
                        tracing::warn!("Invalid host event: {e}");
                        let message = HostMessage::Error {
                            message: format!("invalid host event: {e}"),
                        };
                        write_message(&mut out, &message).await?;
                    }
                }
            }
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
        }

        for message in extension.tick().await {
            write_message(&mut out, &message).await?;
        }
    }

    extension.deactivate().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Toolchain => print_toolchain(cli.config).await,
        Commands::Serve => serve(cli.config).await,
        Commands::Match => print_matches(),
    }
}
