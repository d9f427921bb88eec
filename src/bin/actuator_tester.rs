//! `actuator-tester` binary: drive the sorting hardware by hand.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin actuator-tester -- start
//! cargo run --bin actuator-tester -- --device /dev/ttyACM0 --baud 9600 verdict rotten
//! cargo run --bin actuator-tester -- --file tokens.txt verdict fresh --repeat 3
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use trackfuse_rs::integration::{
    ActuatorCommand, ActuatorLink, Connector, DevicePath, SerialDevice,
};
use trackfuse_rs::{Category, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "actuator-tester", version, about = "Send commands to the sorting actuator")]
struct Cli {
    /// Serial device to open; overrides the config.
    #[arg(short, long, value_name = "PATH", conflicts_with = "file")]
    device: Option<PathBuf>,

    /// Baud rate; overrides the config.
    #[arg(short, long, conflicts_with = "file")]
    baud: Option<u32>,

    /// Append to a plain file instead of opening a serial line.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Pipeline configuration providing the actuator port.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the belt
    Start,
    /// Stop the belt
    Stop,
    /// Reset the sorter
    Reset,
    /// Send the token for a verdict
    Verdict {
        #[arg(value_enum)]
        category: VerdictArg,
        /// Number of times to send it
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
        /// Pause between repeats, in milliseconds
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VerdictArg {
    Fresh,
    Rotten,
    NonTarget,
}

impl From<VerdictArg> for Category {
    fn from(arg: VerdictArg) -> Self {
        match arg {
            VerdictArg::Fresh => Category::Fresh,
            VerdictArg::Rotten => Category::Rotten,
            VerdictArg::NonTarget => Category::NonTarget,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let connector: Box<dyn Connector> = match cli.file {
        Some(path) => Box::new(DevicePath::new(path)),
        None => {
            let mut actuator = match &cli.config {
                Some(path) => {
                    PipelineConfig::load(path)
                        .with_context(|| format!("loading config {}", path.display()))?
                        .actuator
                }
                None => PipelineConfig::default().actuator,
            };
            if let Some(device) = cli.device {
                actuator.port = device;
            }
            if let Some(baud) = cli.baud {
                actuator.baud_rate = baud;
            }
            Box::new(SerialDevice::from_config(&actuator))
        }
    };
    let device = connector.describe();

    let mut link = ActuatorLink::open(connector);
    if !link.is_connected() {
        bail!("could not open actuator at {device}");
    }

    match cli.command {
        Command::Start => {
            link.send_command(ActuatorCommand::Start)?;
        }
        Command::Stop => {
            link.send_command(ActuatorCommand::Stop)?;
        }
        Command::Reset => {
            link.send_command(ActuatorCommand::Reset)?;
            link.complete_reset();
        }
        Command::Verdict {
            category,
            repeat,
            interval_ms,
        } => {
            let category = Category::from(category);
            for i in 0..repeat {
                if i > 0 {
                    thread::sleep(Duration::from_millis(interval_ms));
                }
                link.send_verdict(category)?;
            }
        }
    }

    info!(%device, status = ?link.status(), "done");
    Ok(())
}
