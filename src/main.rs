//! CLI entry point for instrument_control
//!
//! Without a subcommand the interactive shell starts. The other subcommands
//! are one-shot helpers for scripts:
//!
//! ```bash
//! instrument-cli discover 192.168.1.0/24
//! instrument-cli identify 192.168.1.20
//! instrument-cli send 192.168.1.20 "*IDN?"
//! instrument-cli upload-script 192.168.1.20 sweep sweep.tsp --execute
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use instrument_control::cli;
use instrument_control::config::{AppConfig, DEFAULT_CONFIG_PATH};
use instrument_control::device::{Device, DeviceConfig, Instrument};
use instrument_control::devices::{DeviceModel, Kei2600};
use instrument_control::discovery::{DeviceDiscovery, Ipv4Network};
use instrument_control::logging::{self, OutputFormat, TracingConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "instrument-cli")]
#[command(about = "Control networked laboratory instruments", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive shell (default)
    Shell,

    /// Search a network for instruments
    Discover {
        /// Network as <ip>/<prefix> or <ip>/<netmask>
        network: String,

        /// Instrument port, defaults to the configured one
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the identification string of an instrument
    Identify {
        /// Host name or address
        host: String,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Send one command, printing the response of queries (ending in '?')
    Send {
        /// Host name or address
        host: String,

        /// Raw command
        command: String,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Upload a TSP script to a Keithley 2600 series SMU
    UploadScript {
        /// Host name or address
        host: String,

        /// Script name on the instrument
        name: String,

        /// Script file
        file: PathBuf,

        /// Run the script after uploading
        #[arg(long)]
        execute: bool,

        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = AppConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.application.log_level = level;
    }

    let mut tracing_config =
        TracingConfig::from_app_config(&config).map_err(anyhow::Error::msg)?;
    if args.json_logs {
        tracing_config = tracing_config.with_format(OutputFormat::Json);
    }
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    match args.command.unwrap_or(Commands::Shell) {
        Commands::Shell => cli::run_shell(&config).await?,
        Commands::Discover { network, port } => discover(&config, &network, port).await?,
        Commands::Identify { host, port } => identify(&config, host, port).await?,
        Commands::Send { host, command, port } => send(&config, host, &command, port).await?,
        Commands::UploadScript { host, name, file, execute, port } => {
            upload_script(&config, host, &name, file, execute, port).await?
        }
    }
    Ok(())
}

fn device_config(config: &AppConfig, host: String, port: Option<u16>) -> DeviceConfig {
    DeviceConfig::new(host)
        .with_port(port.unwrap_or(config.connection.port))
        .with_timeout(config.connection.timeout())
}

async fn discover(config: &AppConfig, network: &str, port: Option<u16>) -> Result<()> {
    let network: Ipv4Network = network.parse()?;
    let found = DeviceDiscovery::new(network)
        .with_port(port.unwrap_or(config.connection.port))
        .with_probe_timeout(config.discovery.probe_timeout())
        .with_max_concurrency(config.discovery.max_concurrency)
        .discover()
        .await;

    if found.is_empty() {
        println!("No instruments found in {network}");
    }
    for device in found {
        println!("{device}");
    }
    Ok(())
}

async fn identify(config: &AppConfig, host: String, port: Option<u16>) -> Result<()> {
    let mut device = Device::new(device_config(config, host, port));
    device.connect().await?;
    let identity = device.identify().await;
    device.disconnect().await?;

    let identity = identity?;
    match DeviceModel::from_identity(&identity) {
        Some(model) => println!("{identity}\nDriver: {} ({})", model.id(), model),
        None => println!("{identity}\nDriver: none"),
    }
    Ok(())
}

async fn send(config: &AppConfig, host: String, command: &str, port: Option<u16>) -> Result<()> {
    let mut device = Device::new(device_config(config, host, port));
    device.connect().await?;
    let result = if command.trim_end().ends_with('?') {
        device.query_str(command).await.map(Some)
    } else {
        device.exec_str(command).await.map(|()| None)
    };
    device.disconnect().await?;

    if let Some(response) = result? {
        println!("{response}");
    }
    Ok(())
}

async fn upload_script(
    config: &AppConfig,
    host: String,
    name: &str,
    file: PathBuf,
    execute: bool,
    port: Option<u16>,
) -> Result<()> {
    let script = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let mut smu = Kei2600::new(device_config(config, host, port));
    if execute {
        smu.device_mut().connect().await?;
        let result = smu.send_and_execute_script(name, &script).await;
        smu.device_mut().disconnect().await?;
        result?;
        println!("Script '{name}' uploaded and started");
    } else {
        smu.send_script(name, &script).await?;
        println!("Script '{name}' uploaded");
    }
    Ok(())
}
