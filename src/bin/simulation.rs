//! Standalone plant simulation
//!
//! Runs the digital twin and writes one JSON envelope per reading to stdout,
//! for piping into `twinpulse --stdin` or any other consumer. Logs go to
//! stderr.
//!
//! # Usage
//! ```bash
//! ./simulation --seed 7 --ticks 600 --speed 60 | ./twinpulse --stdin
//! ./simulation --force-fault sector_1/line_1/asset_2 --ticks 10 > faulted.jsonl
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use twinpulse::config::PlantConfig;
use twinpulse::publisher::{LineTransport, TelemetryPublisher};
use twinpulse::topology::TopologyRegistry;
use twinpulse::twin::{FaultMode, SimulationDriver, TwinGenerator};
use twinpulse::types::AssetId;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Digital-twin telemetry generator (JSON lines on stdout)")]
#[command(version)]
struct Args {
    /// Plant configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many ticks (default: run until Ctrl+C)
    #[arg(long)]
    ticks: Option<u64>,

    /// Time compression factor (1 = real-time, 100 = 100x faster)
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=10000))]
    speed: u32,

    /// Force an asset into the faulted state at startup (repeatable)
    #[arg(long, value_name = "SECTOR/LINE/ASSET")]
    force_fault: Vec<AssetId>,

    /// Force an asset into the degrading state at startup (repeatable)
    #[arg(long, value_name = "SECTOR/LINE/ASSET")]
    force_degrade: Vec<AssetId>,

    /// Emit logs as JSON objects
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    twinpulse::logging::init(args.log_json);

    let config = PlantConfig::load(args.config.as_deref()).context("Failed to load plant configuration")?;
    let registry = Arc::new(TopologyRegistry::load(&config).context("Failed to build plant topology")?);

    let period = Duration::from_millis((config.simulation.interval_ms / u64::from(args.speed)).max(1));
    let mut generator = TwinGenerator::new(&registry, &config.simulation, args.seed);

    let forced = args
        .force_fault
        .iter()
        .map(|a| (a, FaultMode::Faulted))
        .chain(args.force_degrade.iter().map(|a| (a, FaultMode::Degrading)));
    for (asset, mode) in forced {
        if !generator.force_mode(asset, mode) {
            anyhow::bail!("asset {asset} is not in the plant topology");
        }
    }

    info!(
        plant = %config.plant.name,
        assets = registry.asset_count(),
        sensors = registry.sensor_count(),
        seed = generator.seed(),
        period_ms = period.as_millis() as u64,
        "Simulation starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown_token.cancel();
    });

    let publisher = TelemetryPublisher::new(Arc::new(LineTransport::stdout()), Arc::clone(&registry), &config.publisher);
    let (batches, batch_rx) = publisher.batch_channel();
    let publisher_task = tokio::spawn(publisher.run(batch_rx, period, cancel_token.clone()));

    SimulationDriver::new(generator, batches, period, cancel_token)
        .with_max_ticks(args.ticks)
        .run()
        .await;

    // The driver dropped its sender; the publisher drains the last batch and stops.
    let stats = publisher_task.await.context("Publisher task panicked")?;
    info!(
        published = stats.published,
        dropped = stats.dropped,
        "Simulation complete"
    );
    Ok(())
}
