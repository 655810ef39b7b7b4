//! headpin-sim — runs the pinned-block tracker against a synthetic chain and
//! prints a JSON summary of where it ended up.

mod chain;
mod collaborators;
mod config;
mod consumer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use headpin_tracker::{init_logging, spawn_tracker, Collaborators, ShutdownController};
use serde::Serialize;

use crate::chain::SyntheticChain;
use crate::collaborators::{CountingUnpinSink, SyntheticRuntimes};
use crate::config::SimConfig;
use crate::consumer::{run_consumer, ConsumerStats};

#[derive(Parser)]
#[command(name = "headpin-sim", about = "Drive the headpin tracker with a synthetic chain")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Canonical blocks to produce.
    #[arg(long, env = "HEADPIN_BLOCKS")]
    blocks: Option<u64>,

    /// Add a fork block every N blocks (0 disables forks).
    #[arg(long, env = "HEADPIN_FORK_EVERY")]
    fork_every: Option<u64>,

    /// Introduce a new runtime every N blocks (0 disables upgrades).
    #[arg(long, env = "HEADPIN_UPGRADE_EVERY")]
    upgrade_every: Option<u64>,

    /// Blocks by which finalization trails the best block.
    #[arg(long, env = "HEADPIN_FINALITY_LAG")]
    finality_lag: Option<u64>,

    /// Delay between blocks, in milliseconds.
    #[arg(long, env = "HEADPIN_BLOCK_INTERVAL_MS")]
    block_interval_ms: Option<u64>,

    /// Cleanup scheduler period, in milliseconds.
    #[arg(long, env = "HEADPIN_CLEANUP_INTERVAL_MS")]
    cleanup_interval_ms: Option<u64>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "HEADPIN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "HEADPIN_LOG_FORMAT")]
    log_format: Option<String>,

    /// Print Prometheus metrics to stderr on exit.
    #[arg(long, env = "HEADPIN_PRINT_METRICS")]
    print_metrics: bool,
}

impl Cli {
    fn apply(&self, config: &mut SimConfig) {
        let chain = &mut config.chain;
        chain.blocks = self.blocks.unwrap_or(chain.blocks);
        chain.fork_every = self.fork_every.unwrap_or(chain.fork_every);
        chain.upgrade_every = self.upgrade_every.unwrap_or(chain.upgrade_every);
        chain.finality_lag = self.finality_lag.unwrap_or(chain.finality_lag);
        chain.block_interval_ms = self.block_interval_ms.unwrap_or(chain.block_interval_ms);

        let tracker = &mut config.tracker;
        tracker.cleanup_interval_ms = self
            .cleanup_interval_ms
            .unwrap_or(tracker.cleanup_interval_ms);
        if let Some(level) = &self.log_level {
            tracker.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            tracker.log_format = format.clone();
        }
    }
}

#[derive(Serialize)]
struct Summary {
    best: String,
    finalized: String,
    pinned_blocks: usize,
    held_blocks: usize,
    pruned_pending: usize,
    runtimes: usize,
    runtimes_built: usize,
    events_applied: u64,
    unpin_batches: usize,
    blocks_unpinned: usize,
    consumer: ConsumerStats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::from_toml_file(path)?,
        None => SimConfig::default(),
    };
    cli.apply(&mut config);
    config.tracker.validate()?;
    init_logging(config.tracker.log_format(), &config.tracker.log_level)?;

    tracing::info!(
        blocks = config.chain.blocks,
        fork_every = config.chain.fork_every,
        upgrade_every = config.chain.upgrade_every,
        finality_lag = config.chain.finality_lag,
        cleanup_interval_ms = config.tracker.cleanup_interval_ms,
        "starting simulation"
    );

    let chain = SyntheticChain::new(config.chain.clone());
    let runtimes = Arc::new(SyntheticRuntimes::new(Duration::from_millis(
        config.chain.runtime_build_ms,
    )));
    let unpin_sink = Arc::new(CountingUnpinSink::default());
    let collaborators = Collaborators {
        headers: Arc::new(chain.headers()),
        runtimes: runtimes.clone(),
        unpin_sink: unpin_sink.clone(),
    };

    // Leave room for three cleanup ticks after the last block.
    let settle = config.tracker.cleanup_interval() * 3;
    let shutdown = ShutdownController::new();
    let handle = spawn_tracker(
        &config.tracker,
        chain.into_stream(settle),
        collaborators,
        shutdown.subscribe(),
    )?;

    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_signal().await })
    };
    let consumer = tokio::spawn(run_consumer(handle.subscribe(), handle.usage()));

    let snapshots = handle.subscribe();
    let metrics = handle.metrics();
    let outcome = handle.join().await;
    signal.abort();
    let consumer = consumer.await?;

    let snapshot = snapshots.borrow().clone();
    if cli.print_metrics {
        eprintln!("{}", metrics.encode());
    }
    outcome?;

    let summary = Summary {
        best: snapshot.best.to_string(),
        finalized: snapshot.finalized.to_string(),
        pinned_blocks: snapshot.len(),
        held_blocks: snapshot.blocks.values().filter(|b| b.ref_count > 0).count(),
        pruned_pending: snapshot.pruned.len(),
        runtimes: snapshot.runtimes.len(),
        runtimes_built: runtimes.built(),
        events_applied: metrics.events_applied.get(),
        unpin_batches: unpin_sink.batches(),
        blocks_unpinned: unpin_sink.blocks(),
        consumer,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    tracing::info!("simulation finished");
    Ok(())
}
