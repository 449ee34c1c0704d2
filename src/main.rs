//! Hubby CLI - connect to a hub and pipe stdin/stdout through it.
//!
//! This is the binary entry point. See the `hubby` library for the
//! connection itself.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hubby::{HubConfig, HubConnection, LogSink};
use mimalloc::MiMalloc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "hubby")]
#[command(version)]
#[command(about = "Persistent TCP client for hub servers")]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a hub; send stdin lines, print received bytes to stdout
    Connect {
        /// Hub host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Hub port (overrides config)
        #[arg(long)]
        port: Option<u16>,
        /// Hub identifier sent in the handshake (overrides config)
        #[arg(long, allow_negative_numbers = true)]
        hub_id: Option<i64>,
        /// Local client identifier (overrides config)
        #[arg(long, allow_negative_numbers = true)]
        client_id: Option<i64>,
    },
    /// Print the resolved configuration
    Config,
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    // stdout carries hub data, so logs go to a file or stderr.
    if let Ok(path) = std::env::var("HUBBY_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(env_logger::Target::Stderr);
    }
    builder.init();
    Ok(())
}

/// Connect and pump stdin lines to the hub until stdin ends, Ctrl+C, or the
/// hub stops sending.
async fn run_connect(config: HubConfig) -> Result<()> {
    let on_data = |data: &[u8]| {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(data).and_then(|()| out.flush()) {
            log::warn!("[Hubby] stdout write failed: {e}");
        }
    };

    let conn = HubConnection::open(&config, on_data, LogSink)
        .await
        .with_context(|| format!("Failed to connect to hub at {}", config.addr()))?;

    let dropped = pump_lines(conn, tokio::io::BufReader::new(tokio::io::stdin())).await?;
    if dropped > 0 {
        eprintln!("{dropped} queued writes were not sent");
    }
    Ok(())
}

/// Submit each input line (newline included) until input ends, Ctrl+C, or
/// the read loop stops, then close the connection.
///
/// Returns the number of queued writes discarded by the close.
async fn pump_lines<R>(conn: HubConnection, input: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        let mut payload = line.into_bytes();
                        payload.push(b'\n');
                        if let Err(e) = conn.submit_write(payload) {
                            log::error!("[Hubby] write rejected: {e}");
                            break;
                        }
                    }
                    None => {
                        log::info!("[Hubby] stdin closed");
                        break;
                    }
                }
            }
            () = conn.read_closed() => {
                log::info!("[Hubby] read loop stopped");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("[Hubby] interrupted");
                break;
            }
        }
    }

    Ok(conn.close().await)
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let mut config = HubConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Connect {
            host,
            port,
            hub_id,
            client_id,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(hub_id) = hub_id {
                config.hub_id = hub_id;
            }
            if let Some(client_id) = client_id {
                config.client_id = client_id;
            }
            config.validate()?;

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let result = runtime.block_on(run_connect(config));
            // The stdin reader thread may still be parked in a blocking read.
            runtime.shutdown_background();
            result?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
