//! rs232-reader - record a serial line into per-session files
//!
//! Subcommands:
//! - `rs232-reader` / `rs232-reader record` - Record until SIGINT/SIGTERM or a fatal error
//! - `rs232-reader config` - Show the effective configuration and where it came from
//! - `rs232-reader ports` - List serial ports on this machine

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rs232conf::{parse_duration, DataBits, Parity, ReaderConfig, StopBits};
use tokio_util::sync::CancellationToken;
use tracing::info;

use rs232_reader::{ensure_work_dir, list_ports, open_serial, telemetry, Pipeline, RecorderConfig};

#[derive(Parser)]
#[command(name = "rs232-reader")]
#[command(about = "Record a serial line into one file per session")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ./rs232-reader.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial device (e.g., /dev/ttyUSB0)
    #[arg(long, global = true)]
    device_path: Option<String>,

    #[arg(long, global = true)]
    baud_rate: Option<u32>,

    /// none, odd or even
    #[arg(long, global = true)]
    parity: Option<Parity>,

    /// 1 or 2
    #[arg(long, global = true)]
    stop_bits: Option<StopBits>,

    /// 5, 6, 7 or 8
    #[arg(long, global = true)]
    data_bits: Option<DataBits>,

    /// Directory that receives session files
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Idle gap that starts a new session (e.g., 5s, 500ms, 2m)
    #[arg(long, global = true, value_parser = parse_duration)]
    session_timeout: Option<Duration>,

    /// Debug logging and echo received bytes to stdout
    #[arg(long, global = true)]
    debug: bool,

    /// Log session lifecycle and progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record sessions (the default)
    Record,

    /// Print the effective configuration as TOML
    Config,

    /// List available serial ports
    Ports,
}

impl Cli {
    /// Flags are the last layer, on top of files and environment.
    fn apply_overrides(&self, config: &mut ReaderConfig) {
        if let Some(device_path) = &self.device_path {
            config.serial.device_path = device_path.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(parity) = self.parity {
            config.serial.parity = parity;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.serial.stop_bits = stop_bits;
        }
        if let Some(data_bits) = self.data_bits {
            config.serial.data_bits = data_bits;
        }
        if let Some(work_dir) = &self.work_dir {
            config.session.work_dir = work_dir.clone();
        }
        if let Some(timeout) = self.session_timeout {
            config.session.timeout = timeout;
        }
        if self.debug {
            config.logging.debug = true;
        }
        if self.verbose {
            config.logging.verbose = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = ReaderConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    telemetry::init(config.logging.effective_level())?;

    match cli.command.unwrap_or(Commands::Record) {
        Commands::Record => record(config).await?,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            println!();
            if sources.files.is_empty() {
                println!("# files: none (compiled defaults)");
            }
            for path in &sources.files {
                println!("# file: {}", path.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
        }
        Commands::Ports => {
            let ports = list_ports().context("Failed to enumerate serial ports")?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{}\t{}", port.name, port.kind);
            }
        }
    }

    Ok(())
}

async fn record(config: ReaderConfig) -> Result<()> {
    let work_dir = &config.session.work_dir;
    ensure_work_dir(work_dir)
        .with_context(|| format!("Work directory {} is unusable", work_dir.display()))?;

    let port = open_serial(&config.serial)
        .with_context(|| format!("Cannot open {}", config.serial.device_path))?;

    info!(
        "rs232-reader {} recording {} into {}",
        env!("CARGO_PKG_VERSION"),
        config.serial.device_path,
        work_dir.display()
    );

    Pipeline::new(port, RecorderConfig::from(&config))
        .with_signal_handling()
        .run(CancellationToken::new())
        .await
        .context("Recording stopped on a fatal error")?;

    Ok(())
}
