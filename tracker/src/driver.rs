//! Pipeline driver: merges every event source into one ordered fold.
//!
//! ```text
//!  follow stream ──► forwarder ──┐
//!  (header lookup)               │
//!  UsageHandle ──────────────────┼──► driver ──► BlockTracker::apply ──► watch (snapshots)
//!  feedback channel ─────────────┘       │                                  │
//!        ▲                               └──► UnpinSink                     │
//!        └──────────── CleanupScheduler ◄───────────────────────────────────┘
//! ```
//!
//! The driver task is the only writer. It stops when the follow stream
//! ends, yields an error, produces an event that breaks the protocol's
//! ordering contract, when the cleanup scheduler dies, or on shutdown.
//! Stopping drops the snapshot publisher, which in turn stops the cleanup
//! scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use headpin_types::{BlockHash, BlockHeader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument;

use crate::tracing_spans::{fold_span, header_lookup_span, subscription_span};
use crate::usage::UsageRequest;
use crate::{
    unpin_channel, BlockTracker, CleanupScheduler, Collaborators, FollowEvent, FollowStream,
    HeaderFetcher, PinnedBlocks, TrackerConfig, TrackerError, TrackerEvent, TrackerMetrics,
    UnpinReceiver, UnpinRequest, UnpinSink, UsageHandle,
};

/// Resolved protocol events buffered between the forwarder and the driver.
const PROTOCOL_BUFFER: usize = 256;

/// Handle to a running pipeline.
pub struct TrackerHandle {
    snapshots: watch::Receiver<Arc<PinnedBlocks>>,
    usage: UsageHandle,
    metrics: Arc<TrackerMetrics>,
    task: JoinHandle<Result<(), TrackerError>>,
}

impl TrackerHandle {
    /// Live snapshot stream; the receiver starts at the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<PinnedBlocks>> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Arc<PinnedBlocks> {
        self.snapshots.borrow().clone()
    }

    pub fn usage(&self) -> UsageHandle {
        self.usage.clone()
    }

    pub fn metrics(&self) -> Arc<TrackerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Wait for the pipeline to stop. `Ok` means the subscription ended or
    /// shutdown was requested; `Err` carries the fatal error.
    pub async fn join(self) -> Result<(), TrackerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(TrackerError::Subscription(format!("tracker task failed: {e}"))),
        }
    }
}

/// Start the pipeline on the current tokio runtime.
///
/// Fails with [`TrackerError::Config`] if `config` does not validate.
pub fn spawn_tracker(
    config: &TrackerConfig,
    source: FollowStream,
    collaborators: Collaborators,
    shutdown: broadcast::Receiver<()>,
) -> Result<TrackerHandle, TrackerError> {
    config.validate()?;

    // The feedback channel has to exist before anything reads snapshots.
    let (unpin_tx, unpin_rx) = unpin_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(PinnedBlocks::default()));
    let (usage_tx, usage_rx) = mpsc::unbounded_channel();
    let metrics = Arc::new(TrackerMetrics::new());

    let (protocol_rx, forwarder) =
        spawn_forwarder(source, collaborators.headers, config.header_timeout());

    let scheduler = tokio::spawn(
        CleanupScheduler::new(config.cleanup_interval())
            .run(snapshot_rx.clone(), unpin_tx)
            .in_current_span(),
    );

    let driver = Driver {
        tracker: BlockTracker::new(collaborators.runtimes),
        snapshots: snapshot_tx,
        unpin_sink: collaborators.unpin_sink,
        metrics: Arc::clone(&metrics),
        forwarder,
    };
    let task = tokio::spawn(
        driver
            .run(protocol_rx, usage_rx, unpin_rx, shutdown, scheduler)
            .instrument(subscription_span()),
    );

    Ok(TrackerHandle {
        snapshots: snapshot_rx,
        usage: UsageHandle::new(usage_tx),
        metrics,
        task,
    })
}

/// Read the follow stream, fill in missing headers, and hand events over in
/// order. A header lookup only delays later protocol events, not usage or
/// unpin traffic.
fn spawn_forwarder(
    mut source: FollowStream,
    headers: Arc<dyn HeaderFetcher>,
    timeout: Duration,
) -> (mpsc::Receiver<Result<TrackerEvent, TrackerError>>, AbortHandle) {
    let (tx, rx) = mpsc::channel(PROTOCOL_BUFFER);
    let task = tokio::spawn(
        async move {
            while let Some(item) = source.next().await {
                let resolved = match item {
                    Ok(event) => resolve(event, headers.as_ref(), timeout).await,
                    Err(e) => Err(e),
                };
                let failed = resolved.is_err();
                if tx.send(resolved).await.is_err() || failed {
                    break;
                }
            }
        }
        .in_current_span(),
    );
    (rx, task.abort_handle())
}

async fn resolve(
    event: FollowEvent,
    headers: &dyn HeaderFetcher,
    timeout: Duration,
) -> Result<TrackerEvent, TrackerError> {
    let fetched = match event.missing_header() {
        Some(hash) => Some(
            fetch_header(headers, hash, timeout)
                .instrument(header_lookup_span(&hash))
                .await?,
        ),
        None => None,
    };
    event.resolve(fetched)
}

async fn fetch_header(
    headers: &dyn HeaderFetcher,
    hash: BlockHash,
    timeout: Duration,
) -> Result<BlockHeader, TrackerError> {
    match tokio::time::timeout(timeout, headers.header(hash)).await {
        Ok(Ok(header)) => Ok(header),
        Ok(Err(e)) => Err(TrackerError::HeaderLookup {
            hash,
            reason: format!("{e:#}"),
        }),
        Err(_) => Err(TrackerError::HeaderLookup {
            hash,
            reason: format!("timed out after {timeout:?}"),
        }),
    }
}

struct Driver {
    tracker: BlockTracker,
    snapshots: watch::Sender<Arc<PinnedBlocks>>,
    unpin_sink: Arc<dyn UnpinSink>,
    metrics: Arc<TrackerMetrics>,
    forwarder: AbortHandle,
}

impl Driver {
    async fn run(
        mut self,
        mut protocol: mpsc::Receiver<Result<TrackerEvent, TrackerError>>,
        mut usage: mpsc::UnboundedReceiver<UsageRequest>,
        mut unpins: UnpinReceiver,
        mut shutdown: broadcast::Receiver<()>,
        mut scheduler: JoinHandle<()>,
    ) -> Result<(), TrackerError> {
        // Usage goes ahead of protocol events so a hold is never queued
        // behind a burst of new blocks.
        let result = loop {
            tokio::select! {
                biased;
                Ok(()) = shutdown.recv() => {
                    tracing::info!("shutdown requested, stopping tracker");
                    break Ok(());
                }
                joined = &mut scheduler => {
                    let reason = match joined {
                        Ok(()) => "exited while the subscription was live".to_string(),
                        Err(e) => e.to_string(),
                    };
                    break Err(TrackerError::CleanupStopped(reason));
                }
                Some(request) = usage.recv() => self.handle_usage(request),
                event = protocol.recv() => match event {
                    Some(Ok(event)) => {
                        if let Err(e) = self.fold(event) {
                            break Err(e);
                        }
                    }
                    Some(Err(e)) => break Err(e),
                    None => {
                        tracing::info!("follow subscription ended");
                        break Ok(());
                    }
                },
                Some(request) = unpins.recv() => self.handle_unpin(request),
            }
        };

        if let Err(e) = &result {
            tracing::error!(error = %e, "follow subscription aborted");
        }
        scheduler.abort();
        self.forwarder.abort();
        self.tracker.teardown();
        result
    }

    fn fold(&mut self, event: TrackerEvent) -> Result<Arc<PinnedBlocks>, TrackerError> {
        let kind = event.kind();
        let _span = fold_span(kind).entered();
        let started = Instant::now();
        let result = self.tracker.apply(event);
        self.metrics
            .fold_time_us
            .observe(started.elapsed().as_micros() as f64);

        match &result {
            Ok(snapshot) => {
                self.metrics.events_applied.inc();
                self.metrics.observe_snapshot(snapshot);
                self.snapshots.send_replace(Arc::clone(snapshot));
            }
            Err(e) => tracing::debug!(event = kind, error = %e, "event rejected"),
        }
        result
    }

    fn handle_usage(&mut self, request: UsageRequest) {
        let UsageRequest { hash, kind, reply } = request;
        let result = self
            .fold(TrackerEvent::Usage { hash, kind })
            .map(|_| ());
        if let Err(e) = &result {
            self.metrics.usage_rejected.inc();
            tracing::warn!(%hash, ?kind, error = %e, "usage request rejected");
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    /// Fold an unpin request from the scheduler and tell the node.
    ///
    /// The request was computed from an older snapshot, so it is narrowed to
    /// blocks that are still unheld and off the finalized-to-best path.
    fn handle_unpin(&mut self, request: UnpinRequest) {
        let hashes = self.tracker.snapshot().unpinnable(&request.hashes);
        if hashes.len() < request.hashes.len() {
            tracing::debug!(
                requested = request.hashes.len(),
                kept = hashes.len(),
                "unpin request narrowed"
            );
        }
        if hashes.is_empty() {
            return;
        }
        if self
            .fold(TrackerEvent::Unpin {
                hashes: hashes.clone(),
            })
            .is_ok()
        {
            self.metrics.blocks_unpinned.inc_by(hashes.len() as u64);
            self.unpin_sink.notify_unpin(&hashes);
        }
    }
}
