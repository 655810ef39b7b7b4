//! Prometheus metrics for the pinned-block tracker.
//!
//! Covers fold throughput, unpin activity and the size of the pinned set.
//! [`TrackerMetrics`] owns a dedicated [`Registry`] that an embedding
//! application can expose however it likes; [`TrackerMetrics::encode`]
//! renders the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::PinnedBlocks;

/// Central collection of tracker-level Prometheus metrics.
pub struct TrackerMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Events successfully folded into the snapshot.
    pub events_applied: IntCounter,
    /// Blocks removed from the pinned set and reported to the node.
    pub blocks_unpinned: IntCounter,
    /// Hold/release calls rejected (unknown block or release without hold).
    pub usage_rejected: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Blocks currently pinned.
    pub pinned_blocks: IntGauge,
    /// Live runtime descriptors.
    pub runtimes: IntGauge,
    /// Pinned blocks with at least one outstanding hold.
    pub held_blocks: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time spent folding a single event, in microseconds.
    pub fold_time_us: Histogram,
}

impl TrackerMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        // Counters
        let events_applied = register_int_counter_with_registry!(
            Opts::new(
                "headpin_events_applied_total",
                "Total events folded into the pinned-block snapshot"
            ),
            registry
        )
        .expect("failed to register events_applied counter");

        let blocks_unpinned = register_int_counter_with_registry!(
            Opts::new(
                "headpin_blocks_unpinned_total",
                "Total blocks unpinned by the cleanup scheduler"
            ),
            registry
        )
        .expect("failed to register blocks_unpinned counter");

        let usage_rejected = register_int_counter_with_registry!(
            Opts::new(
                "headpin_usage_rejected_total",
                "Total hold/release requests rejected"
            ),
            registry
        )
        .expect("failed to register usage_rejected counter");

        // Gauges
        let pinned_blocks = register_int_gauge_with_registry!(
            Opts::new("headpin_pinned_blocks", "Current number of pinned blocks"),
            registry
        )
        .expect("failed to register pinned_blocks gauge");

        let runtimes = register_int_gauge_with_registry!(
            Opts::new("headpin_runtimes", "Current number of runtime descriptors"),
            registry
        )
        .expect("failed to register runtimes gauge");

        let held_blocks = register_int_gauge_with_registry!(
            Opts::new(
                "headpin_held_blocks",
                "Current number of pinned blocks with outstanding holds"
            ),
            registry
        )
        .expect("failed to register held_blocks gauge");

        // Folds are in-memory map updates: 1 µs → ~16 ms.
        let fold_time_us = register_histogram_with_registry!(
            HistogramOpts::new(
                "headpin_fold_time_us",
                "Time to fold one event in microseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register fold_time_us histogram");

        Self {
            registry,
            events_applied,
            blocks_unpinned,
            usage_rejected,
            pinned_blocks,
            runtimes,
            held_blocks,
            fold_time_us,
        }
    }

    /// Refresh the gauges from a freshly published snapshot.
    pub fn observe_snapshot(&self, snapshot: &PinnedBlocks) {
        self.pinned_blocks.set(snapshot.blocks.len() as i64);
        self.runtimes.set(snapshot.runtimes.len() as i64);
        self.held_blocks
            .set(snapshot.blocks.values().filter(|b| b.ref_count > 0).count() as i64);
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for TrackerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
