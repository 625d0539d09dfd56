//! twinpulse - digital-twin telemetry simulator and alarm pipeline
//!
//! Runs the whole loop in one process: the twin generator ticks, the
//! publisher puts readings on an in-process bus, and the validation
//! pipeline stores them and raises alarms.
//!
//! # Usage
//!
//! ```bash
//! # Built-in demo plant, reproducible
//! twinpulse --seed 42
//!
//! # Custom plant, 10x speed, one asset forced into a fault
//! twinpulse --config plant.toml --speed 10 --force-fault sector_1/line_2/asset_3
//!
//! # Consume envelopes produced by the standalone simulator
//! simulation --seed 7 | twinpulse --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `TWINPULSE_CONFIG`: path to the plant TOML (when `--config` is absent)
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use twinpulse::alarm::{self, AlarmEngine};
use twinpulse::config::PlantConfig;
use twinpulse::pipeline::{BusSource, MessageSource, MessageValidator, ProcessingLoop, StdinSource, ValidationPipeline};
use twinpulse::publisher::{InMemoryBus, TelemetryPublisher};
use twinpulse::storage;
use twinpulse::topology::TopologyRegistry;
use twinpulse::twin::{FaultMode, SimulationDriver, TwinGenerator};
use twinpulse::types::AssetId;

/// How long tasks get to wind down after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "twinpulse")]
#[command(about = "Digital-twin telemetry simulator with validation and alarm pipeline")]
#[command(version)]
struct CliArgs {
    /// Plant configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read JSON-lines envelopes from stdin instead of running the simulator
    /// Use with: simulation | twinpulse --stdin
    #[arg(long)]
    stdin: bool,

    /// Random seed (overrides simulation.seed)
    #[arg(long, conflicts_with = "stdin")]
    seed: Option<u64>,

    /// Stop after this many ticks
    #[arg(long, conflicts_with = "stdin")]
    ticks: Option<u64>,

    /// Time compression factor (1 = real-time, 10 = 10x faster)
    #[arg(long, default_value = "1", conflicts_with = "stdin")]
    speed: f64,

    /// Force an asset into the faulted state at startup (repeatable)
    #[arg(long, value_name = "SECTOR/LINE/ASSET", conflicts_with = "stdin")]
    force_fault: Vec<AssetId>,

    /// Emit logs as JSON objects
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, Clone, Copy)]
enum TaskName {
    Simulation,
    Publisher,
    Pipeline,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::Simulation => write!(f, "Simulation"),
            TaskName::Publisher => write!(f, "Publisher"),
            TaskName::Pipeline => write!(f, "Pipeline"),
        }
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Build the consuming side: storage, dispatcher, alarm engine.
fn build_pipeline(config: &PlantConfig, registry: &Arc<TopologyRegistry>) -> Result<ValidationPipeline> {
    let sink = storage::from_config(&config.storage).context("Failed to open reading storage")?;
    let dispatcher =
        alarm::dispatcher::from_config(&config.notifier).context("Failed to build notification dispatcher")?;
    info!(
        storage = sink.name(),
        notifier = dispatcher.name(),
        max_clock_skew_secs = config.pipeline.max_clock_skew_secs,
        "Pipeline configured"
    );

    let engine = AlarmEngine::new(Arc::clone(registry), dispatcher);
    let validator = MessageValidator::new(Arc::clone(registry), config.pipeline.max_clock_skew_secs);
    Ok(ValidationPipeline::new(validator, sink, engine))
}

fn spawn_pipeline<S: MessageSource + 'static>(
    task_set: &mut JoinSet<Result<TaskName>>,
    pipeline: ValidationPipeline,
    mut source: S,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[Pipeline] Task starting");
        let stats = ProcessingLoop::new(pipeline, cancel_token).run(&mut source).await;
        if !stats.rejected_by_reason.is_empty() {
            info!(rejected = ?stats.rejected_by_reason, "[Pipeline] Rejections by reason");
        }
        Ok(TaskName::Pipeline)
    });
}

/// Spawn the generator tick loop and the publisher feeding the bus.
fn spawn_simulation(
    task_set: &mut JoinSet<Result<TaskName>>,
    config: &PlantConfig,
    registry: &Arc<TopologyRegistry>,
    args: &CliArgs,
    bus: InMemoryBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let period = tick_period(config.simulation.interval_ms, args.speed)?;

    let mut generator = TwinGenerator::new(registry, &config.simulation, args.seed);
    force_faults(&mut generator, &args.force_fault)?;

    let publisher = TelemetryPublisher::new(Arc::new(bus), Arc::clone(registry), &config.publisher);
    let (batches, batch_rx) = publisher.batch_channel();

    let pub_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[Publisher] Task starting");
        publisher.run(batch_rx, period, pub_cancel).await;
        Ok(TaskName::Publisher)
    });

    let driver = SimulationDriver::new(generator, batches, period, cancel_token).with_max_ticks(args.ticks);
    task_set.spawn(async move {
        info!("[Simulation] Task starting");
        let generator = driver.run().await;
        let (nominal, degrading, faulted) = generator.mode_counts();
        info!(
            ticks = generator.ticks_elapsed(),
            nominal = nominal,
            degrading = degrading,
            faulted = faulted,
            "[Simulation] Finished"
        );
        Ok(TaskName::Simulation)
    });

    Ok(())
}

fn tick_period(interval_ms: u64, speed: f64) -> Result<Duration> {
    if !speed.is_finite() || speed <= 0.0 {
        anyhow::bail!("--speed must be a positive number (got {speed})");
    }
    Ok(Duration::from_secs_f64(interval_ms as f64 / 1000.0 / speed).max(Duration::from_millis(1)))
}

fn force_faults(generator: &mut TwinGenerator, assets: &[AssetId]) -> Result<()> {
    for asset in assets {
        if !generator.force_mode(asset, FaultMode::Faulted) {
            anyhow::bail!("--force-fault: asset {asset} is not in the plant topology");
        }
    }
    Ok(())
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        return Ok(());
                    }
                }
            }
        }
    }

    // Let tasks log their final stats before exiting.
    let drain = async { while task_set.join_next().await.is_some() {} };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("🛑 Supervisor: Tasks did not stop within {:?}, aborting", SHUTDOWN_GRACE);
        task_set.abort_all();
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    twinpulse::logging::init(args.log_json);

    let config = Arc::new(PlantConfig::load(args.config.as_deref()).context("Failed to load plant configuration")?);
    let registry = Arc::new(TopologyRegistry::load(&config).context("Failed to build plant topology")?);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  twinpulse - digital-twin telemetry");
    info!(
        "  Plant: {} | {} assets | {} sensors",
        config.plant.name,
        registry.asset_count(),
        registry.sensor_count()
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let pipeline = build_pipeline(&config, &registry)?;
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    if args.stdin {
        info!("📥 Input: stdin (JSON-lines envelopes)");
        spawn_pipeline(&mut task_set, pipeline, StdinSource::stdin(), cancel_token.clone());
    } else {
        info!("📥 Input: built-in digital twin (in-process bus)");
        let (bus, rx) = InMemoryBus::new(config.publisher.bus_capacity);
        spawn_pipeline(&mut task_set, pipeline, BusSource::new(rx), cancel_token.clone());
        spawn_simulation(&mut task_set, &config, &registry, &args, bus, cancel_token.clone())?;
    }

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("✓ twinpulse shutdown complete");
    Ok(())
}
