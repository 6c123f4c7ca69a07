use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use makito_core::{
    Connection, ConnectionConfig, FetchFailure, HttpTransport, PollScheduler, SchedulerCadence,
    Snapshot, SnapshotStore, Vars,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod exec;
mod exporter;
mod viewer;
#[cfg(test)]
mod exporter_tests;

#[derive(Debug, Parser)]
#[command(name = "makitod")]
#[command(about = "Haivision Makito X4 decoder poller and control")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,

    #[arg(long, env = "MAKITO_HOST", default_value = "")]
    host: String,

    #[arg(long, env = "MAKITO_PORT", default_value_t = 443)]
    port: u16,

    #[arg(long, env = "MAKITO_USERNAME", default_value = "admin")]
    username: String,

    #[arg(long, env = "MAKITO_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    #[arg(long, env = "MAKITO_INTERVAL_SEC", default_value_t = 5)]
    interval_sec: u64,

    #[arg(long, env = "MAKITO_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,

    /// Connect and refresh once, then stay idle.
    #[arg(long)]
    no_polling: bool,
}

impl Cli {
    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            polling: !self.no_polling,
            poll_interval: Duration::from_secs(self.interval_sec),
            request_timeout: Duration::from_millis(self.timeout_ms),
            cadence: SchedulerCadence::default(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Connect, refresh everything once and print the snapshot.
    Status {
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    Run {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Watch {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Print the flattened variables.
    Vars {
        /// Only this decoder's variables, unprefixed.
        #[arg(long)]
        decoder: Option<usize>,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    /// Run one device command.
    Exec {
        #[command(subcommand)]
        action: exec::Action,
        #[arg(long, value_enum, default_value = "human", global = true)]
        format: OutputFormat,
    },
    Export {
        #[arg(long, default_value = "./data/snapshots")]
        output_dir: String,
        #[arg(long, default_value_t = 90)]
        retention_days: u64,
    },
    View {
        #[arg(long, default_value_t = 180.0)]
        window_sec: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = cli.connection_config();

    match cli.command {
        CliCommand::Status { format } => {
            let mut connection = Connection::http(config)?;
            let failures = connection.connect().await?;
            log_failures(&failures);
            print_snapshot(&connection.store().snapshot(), format)?;
        }
        CliCommand::Run { format } | CliCommand::Watch { format } => {
            let mut scheduler = PollScheduler::new(Connection::http(config)?);
            stream_loop(&mut scheduler, format).await?;
        }
        CliCommand::Vars {
            decoder,
            prefix,
            format,
        } => {
            let mut connection = Connection::http(config)?;
            let failures = connection.connect().await?;
            log_failures(&failures);
            let store = connection.store();
            let vars = match decoder {
                Some(index) if index < makito_core::DECODER_COUNT => store.decoder_vars(index),
                Some(index) => anyhow::bail!("decoder {index} does not exist"),
                None => store.snapshot().vars,
            };
            print_vars(&filter_vars(vars, prefix.as_deref()), format)?;
        }
        CliCommand::Exec { action, format } => {
            let mut connection = Connection::http(config)?;
            exec::run(&mut connection, action, format).await?;
        }
        CliCommand::Export {
            output_dir,
            retention_days,
        } => {
            let mut scheduler = PollScheduler::new(Connection::http(config)?);
            exporter::run_exporter(&mut scheduler, &output_dir, retention_days).await?;
        }
        CliCommand::View { window_sec } => {
            let mut scheduler = PollScheduler::new(Connection::http(config)?);
            viewer::run_viewer(&mut scheduler, window_sec).await?;
        }
    }

    Ok(())
}

/// Cancels the returned token on ctrl-c.
pub(crate) fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received ctrl-c, stopping");
            trigger.cancel();
        }
    });
    token
}

pub(crate) fn log_failures(failures: &[FetchFailure]) {
    for failure in failures {
        warn!(%failure, "refresh incomplete");
    }
}

async fn stream_loop(scheduler: &mut PollScheduler<HttpTransport>, format: OutputFormat) -> Result<()> {
    let failures = scheduler.start().await?;
    log_failures(&failures);
    let store: SnapshotStore = scheduler.store().clone();
    print_snapshot(&store.snapshot(), format)?;

    let cancel = ctrl_c_token();
    scheduler
        .run(cancel, |report| {
            let snapshot = store.snapshot();
            if let Err(err) = print_snapshot(&snapshot, format) {
                warn!(error = %err, "failed to print snapshot");
            }
            info!(
                tick = report.tick,
                status = snapshot.status.code(),
                failures = report.failures.len(),
                skipped = report.skipped,
                "tick"
            );
        })
        .await;

    Ok(())
}

fn filter_vars(vars: Vars, prefix: Option<&str>) -> Vars {
    match prefix {
        Some(prefix) => vars
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect(),
        None => vars,
    }
}

fn print_vars(vars: &Vars, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(vars)?),
        OutputFormat::Ndjson => println!("{}", serde_json::to_string(vars)?),
        OutputFormat::Human => {
            let width = vars.keys().map(String::len).max().unwrap_or(0);
            for (key, value) in vars {
                println!("{key:<width$}  {}", display_value(value));
            }
        }
    }
    Ok(())
}

pub(crate) fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn text(vars: &Vars, key: &str) -> String {
    vars.get(key).map(display_value).unwrap_or_else(|| "N/A".to_string())
}

pub(crate) fn print_snapshot(snapshot: &Snapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
        }
        OutputFormat::Ndjson => {
            println!("{}", serde_json::to_string(snapshot)?);
        }
        OutputFormat::Human => {
            let system = &snapshot.system;
            println!("=== Makito X4 Snapshot ===");
            println!("Time:       {}", snapshot.ts.to_rfc3339());
            println!(
                "Device:     {} {} (serial {}, firmware {})",
                text(system, "device_type"),
                text(system, "device_ip"),
                text(system, "device_serial"),
                text(system, "device_version"),
            );
            println!(
                "State:      {} status={} tick={} temperature={} uptime={}",
                text(system, "connection_status"),
                snapshot.status.code(),
                snapshot.tick,
                text(system, "device_temperature"),
                text(system, "device_uptime"),
            );
            if let Some(detail) = snapshot.status.detail() {
                println!("Detail:     {detail}");
            }
            println!(
                "Presets:    active={} autosave={} ({} stored)",
                text(system, "preset_active"),
                text(system, "preset_autosave"),
                snapshot.presets.len(),
            );
            println!("Streams:    {}", text(system, "stream_count"));

            for (index, decoder) in snapshot.decoders.iter().enumerate() {
                println!(
                    "Decoder {index}:  {:<16} {:<22} stream={} bitrate={} signal={}",
                    text(decoder, "name"),
                    text(decoder, "state"),
                    text(decoder, "stream_name"),
                    text(decoder, "stream_bitrate"),
                    text(decoder, "signal"),
                );
                if let Some(Some(thumbnail)) = snapshot.thumbnails.get(index) {
                    println!(
                        "            thumbnail {} {} bytes at {}",
                        thumbnail.mime_type,
                        thumbnail.len,
                        thumbnail.fetched_at.to_rfc3339()
                    );
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn write_file(path: &str, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("writing {path}"))
}
