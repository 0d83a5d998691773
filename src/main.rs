//! CLI Entry Point for sds011
//!
//! Provides command-line interface for:
//! - Streaming readings as `<timestamp>,<pm2.5>,<pm10>` lines (no subcommand)
//! - Reading or setting the reporting mode (`mode`)
//! - Reading or setting the working period (`cycle`)
//! - Printing device information (`info`)
//!
//! # Usage
//!
//! Stream readings, querying every 30 seconds if the sensor is in passive mode:
//! ```bash
//! sds011 -p /dev/ttyUSB0 -i 30
//! ```
//!
//! Switch the sensor to active mode:
//! ```bash
//! sds011 mode active
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sds011_daq::acquisition::{run_until_shutdown, CsvSink, ShutdownController};
use sds011_daq::config::{ConfigOverrides, Sds011Config};
use sds011_daq::control::{cycle_command, info_command, mode_command};
use sds011_daq::hardware::sds011::MAX_WORKING_PERIOD;
use sds011_daq::hardware::Sds011Connector;
use sds011_daq::tracing_setup;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sds011")]
#[command(about = "Read PM2.5 and PM10 concentrations from an SDS011 sensor", long_about = None)]
struct Cli {
    /// Serial port the sensor is attached to [default: /dev/ttyUSB0]
    #[arg(short = 'p', long, alias = "port_path", global = true)]
    port_path: Option<String>,

    /// Seconds between queries when the sensor is in passive mode [default: 10]
    #[arg(short, long, global = true, value_parser = clap::value_parser!(u8).range(1..))]
    interval: Option<u8>,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or set the reporting mode
    ///
    /// active: the sensor measures continuously whether or not it is read.
    /// passive: the sensor measures only when queried.
    Mode {
        /// New mode (active or passive)
        mode: Option<String>,
    },

    /// Read or set the working period in minutes
    ///
    /// 0 measures continuously (about once per second), 1-30 measures once
    /// every N minutes.
    Cycle {
        /// New working period
        #[arg(value_parser = clap::value_parser!(u8).range(0..=i64::from(MAX_WORKING_PERIOD)))]
        minutes: Option<u8>,
    },

    /// Show device id, firmware and current settings
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        port_path: cli.port_path,
        interval_secs: cli.interval,
        log_level: cli.log_level,
    };
    let config = Sds011Config::load(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    tracing_setup::init_from_config(&config).context("Failed to initialize logging")?;

    let connector = Sds011Connector::from_config(&config.sensor);
    let port = config.sensor.port_path.as_str();

    match cli.command {
        None => stream_readings(&connector, &config).await,
        Some(Commands::Mode { mode }) => {
            if let Some(text) = mode_command(&connector, port, mode.as_deref()).await? {
                println!("{text}");
            }
            Ok(())
        }
        Some(Commands::Cycle { minutes }) => {
            if let Some(text) = cycle_command(&connector, port, minutes).await? {
                println!("{text}");
            }
            Ok(())
        }
        Some(Commands::Info) => {
            println!("{}", info_command(&connector, port).await?);
            Ok(())
        }
    }
}

async fn stream_readings(connector: &Sds011Connector, config: &Sds011Config) -> Result<()> {
    // Registered before establishment so an early Ctrl-C still exits cleanly
    let shutdown = ShutdownController::install().context("Failed to install signal handlers")?;

    let mut sink = CsvSink::new(std::io::stdout());
    run_until_shutdown(connector, config, &shutdown, &mut sink)
        .await
        .with_context(|| format!("Acquisition from {} failed", config.sensor.port_path))?;
    Ok(())
}
