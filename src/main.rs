//! Command-line front end for the DSP 7265 adapter.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lockin_daq::adapters::{MockLink, VisaLink};
use lockin_daq::attributes::{self, names};
use lockin_daq::config::{self, LockinConfig};
use lockin_daq::logging::init_tracing;
use lockin_daq::{DeviceBinding, Dsp7265, InstrumentLink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lockin_daq")]
#[command(about = "Attribute access to a Signal Recovery DSP 7265 lock-in amplifier", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    /// Use the in-memory simulated instrument
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attribute names
    List,
    /// Print an attribute descriptor as JSON
    Describe { name: String },
    /// Read an attribute
    Get { name: String },
    /// Write an attribute (index or label for enumerated attributes)
    Set { name: String, value: String },
    /// Read the signal channels repeatedly
    Poll {
        /// Number of samples
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u32,
        /// Delay between samples in milliseconds
        #[arg(short, long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LockinConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_tracing(&config.logging.level);

    let link = open_link(&config, cli.mock).await?;
    let adapter = Arc::new(Dsp7265::new(link, config.link.timeout())?);
    let binding = DeviceBinding::init(adapter, config.device.clone())
        .await
        .context("initialising device")?;
    info!("{}", binding.status().await);

    match cli.command {
        Commands::List => {
            for name in binding.attribute_names() {
                let descriptor = binding.describe(&name)?;
                println!("{:<14} {}", name, descriptor.label);
            }
        }
        Commands::Describe { name } => {
            let descriptor = binding.describe(&name)?;
            println!("{}", serde_json::to_string_pretty(descriptor)?);
        }
        Commands::Get { name } => {
            println!("{}", binding.read_formatted(&name).await?);
        }
        Commands::Set { name, value } => {
            let parsed = attributes::parse_value(binding.describe(&name)?, &value)?;
            binding.write_attribute(&name, parsed).await?;
            println!("{}", binding.read_formatted(&name).await?);
        }
        Commands::Poll { count, interval_ms } => {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            for _ in 0..count {
                ticker.tick().await;
                let mut line = Vec::with_capacity(4);
                for name in [names::X, names::Y, names::R, names::THETA] {
                    match binding.read_formatted(name).await {
                        Ok(text) => line.push(format!("{name}={}", text.trim())),
                        Err(e) => line.push(format!("{name}=<{e}>")),
                    }
                }
                println!("{}", line.join("  "));
            }
            info!("{}", binding.status().await);
        }
    }

    Ok(())
}

async fn open_link(config: &LockinConfig, mock: bool) -> Result<Arc<dyn InstrumentLink>> {
    if mock || !cfg!(feature = "instrument_visa") {
        if !mock {
            warn!("Built without instrument_visa, using the simulated instrument");
        }
        return Ok(Arc::new(MockLink::new()));
    }

    let link = VisaLink::new(config.device.address.clone()).with_timeout(config.link.timeout());
    link.connect()
        .await
        .with_context(|| format!("opening {}", config.device.address))?;
    Ok(Arc::new(link))
}
