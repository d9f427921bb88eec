//! `replay` binary: run the decision pipeline offline over a detection log.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin replay -- --log detections.jsonl
//! cargo run --bin replay -- --config line.toml --log detections.jsonl --actuator /dev/ttyUSB0
//! cargo run --bin replay -- --log detections.jsonl --actuator-file tokens.txt
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use trackfuse_rs::frame::blank_frame;
use trackfuse_rs::integration::{
    DevicePath, MemoryCropSink, NoClassifier, ReplaySource, SerialDevice,
};
use trackfuse_rs::{DecisionPipeline, ManualClock, PipelineConfig, QueueConsumer};

/// Added to the last timestamp so the final tick expires every live track.
const FLUSH_MARGIN: f64 = 1e-3;

#[derive(Parser, Debug)]
#[command(name = "replay", version, about = "Replay a tracker log through the decision pipeline")]
struct Args {
    /// Pipeline configuration; defaults are used when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON-lines detection log.
    #[arg(short, long, value_name = "FILE")]
    log: PathBuf,

    /// Write non-target crops to the configured directories.
    #[arg(long, default_value_t = false)]
    save_crops: bool,

    /// Send verdict tokens to this serial device at the configured baud rate.
    #[arg(long, value_name = "PATH", conflicts_with = "actuator_file")]
    actuator: Option<PathBuf>,

    /// Append verdict tokens to a plain file instead.
    #[arg(long, value_name = "PATH")]
    actuator_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let source = ReplaySource::open(&args.log)
        .with_context(|| format!("reading replay log {}", args.log.display()))?;
    info!(records = source.remaining(), "replay log loaded");

    let clock = ManualClock::new(source.peek_time().unwrap_or(0.0));
    let frame = blank_frame(config.frame.width as usize, config.frame.height as usize);
    let mut pipeline = DecisionPipeline::new(&config, source, NoClassifier)
        .context("building pipeline")?
        .with_clock(clock.clone());
    // Recorded logs carry no crops worth classifying.
    pipeline.set_classification_enabled(false);
    if !args.save_crops {
        pipeline = pipeline.with_crop_sink(MemoryCropSink::new());
    }
    if let Some(path) = &args.actuator {
        let mut actuator = config.actuator.clone();
        actuator.port = path.clone();
        pipeline = pipeline.with_actuator(SerialDevice::from_config(&actuator));
    } else if let Some(path) = &args.actuator_file {
        pipeline = pipeline.with_actuator(DevicePath::new(path));
    }

    let queue = pipeline.queue();
    let consumer = QueueConsumer::spawn(queue.clone(), Duration::from_millis(50), |item| {
        info!(
            track_id = item.track_id,
            category = %item.category,
            created_at = item.created_at,
            "handoff"
        );
    });

    let mut ticks = 0u64;
    let mut verdicts = 0usize;
    let mut non_target_crops = 0usize;
    while let Some(t) = pipeline.tracker().peek_time() {
        clock.set(t);
        let report = pipeline.tick(&frame);
        verdicts += report.verdicts.len();
        non_target_crops += report.non_target_crops;
        ticks += 1;
    }

    let last = pipeline.tracker().last_time().unwrap_or(0.0);
    clock.set(last + pipeline.track_timeout() + FLUSH_MARGIN);
    let report = pipeline.tick(&frame);
    verdicts += report.verdicts.len();
    non_target_crops += report.non_target_crops;

    let mut handled = consumer.stop();
    while let Some(item) = queue.try_pop() {
        info!(track_id = item.track_id, category = %item.category, "handoff (drained)");
        handled += 1;
    }

    let summary = json!({
        "ticks": ticks,
        "tallies": pipeline.counts(),
        "verdicts": verdicts,
        "handed_off": handled,
        "dropped": queue.dropped(),
        "non_target_crops": non_target_crops,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
