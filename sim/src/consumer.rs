//! A consumer that uses every new best block: it holds the block, waits for
//! the block's runtime, then releases it.

use std::sync::Arc;

use headpin_runtime::RuntimeError;
use headpin_tracker::{PinnedBlocks, UsageHandle};
use headpin_types::BlockHash;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;

#[derive(Debug, Default, Serialize)]
pub struct ConsumerStats {
    pub blocks_used: usize,
    pub runtimes_ready: usize,
    pub runtime_failures: usize,
}

impl ConsumerStats {
    fn record(&mut self, outcome: Result<(BlockHash, u32), RuntimeError>) {
        match outcome {
            Ok((hash, spec_version)) => {
                self.runtimes_ready += 1;
                tracing::debug!(%hash, spec_version, "runtime ready for best block");
            }
            Err(e) => {
                self.runtime_failures += 1;
                tracing::warn!(error = %e, "runtime unavailable for best block");
            }
        }
    }
}

/// Runs until the snapshot publisher goes away.
pub async fn run_consumer(
    mut snapshots: watch::Receiver<Arc<PinnedBlocks>>,
    usage: UsageHandle,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    let mut last_best = None;
    let mut inflight = JoinSet::new();

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        if !snapshot.is_initialized() || last_best == Some(snapshot.best) {
            continue;
        }
        let best = snapshot.best;
        last_best = Some(best);
        let Some(runtime) = snapshot.runtime_of(&best).cloned() else {
            continue;
        };
        let hold = match usage.acquire(best).await {
            Ok(hold) => hold,
            Err(e) => {
                tracing::debug!(%best, error = %e, "could not hold best block");
                continue;
            }
        };
        stats.blocks_used += 1;
        inflight.spawn(async move {
            let ready = runtime.ready().await;
            if let Err(e) = hold.release().await {
                tracing::debug!(%best, error = %e, "release failed");
            }
            ready.map(|metadata| (best, metadata.spec_version))
        });
    }

    while let Some(joined) = inflight.join_next().await {
        match joined {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                stats.runtime_failures += 1;
                tracing::warn!(error = %e, "consumer task failed");
            }
        }
    }
    stats
}
