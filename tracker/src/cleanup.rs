//! Cleanup scheduler: finds blocks nobody needs and asks for them to be unpinned.
//!
//! On every tick the scheduler reads the latest snapshot and collects the
//! unheld blocks behind `finalized` (plus unheld pruned fork blocks). A block
//! is only reported once it has been a candidate on two consecutive ticks, so
//! a consumer that grabs it right after a tick still gets it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use headpin_types::BlockHash;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::tracing_spans::cleanup_tick_span;
use crate::{PinnedBlocks, UnpinSender};

/// Blocks in `snapshot` that could be unpinned if nobody claims them.
///
/// Takes the unheld finalized ancestors above the highest held one (a held
/// ancestor keeps everything below it pinned), then adds unheld pruned blocks
/// that are neither best nor on the way to it.
pub fn unpin_candidates(snapshot: &PinnedBlocks) -> HashSet<BlockHash> {
    let mut candidates: HashSet<BlockHash> = snapshot
        .releasable_ancestors(|node| node.ref_count == 0)
        .into_iter()
        .collect();

    if !snapshot.pruned.is_empty() {
        let protected = snapshot.best_chain();
        candidates.extend(
            snapshot
                .pruned
                .iter()
                .filter(|hash| !protected.contains(hash))
                .filter(|hash| snapshot.get(hash).is_some_and(|node| node.ref_count == 0)),
        );
    }
    candidates
}

/// Two-tick debounce over [`unpin_candidates`].
#[derive(Debug, Default)]
pub struct UnpinDebounce {
    previous: HashSet<BlockHash>,
}

impl UnpinDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this tick's candidates and return the ones that were also
    /// candidates on the previous tick, lowest height first.
    ///
    /// Returned hashes are forgotten; if they survive the unpin they need two
    /// more observations before being reported again.
    pub fn observe(&mut self, snapshot: &PinnedBlocks) -> Vec<BlockHash> {
        let mut current = unpin_candidates(snapshot);
        let mut confirmed: Vec<BlockHash> = current
            .iter()
            .filter(|hash| self.previous.contains(hash))
            .copied()
            .collect();
        for hash in &confirmed {
            current.remove(hash);
        }
        confirmed.sort_by_key(|hash| (snapshot.get(hash).map(|node| node.number), *hash));
        self.previous = current;
        confirmed
    }

    /// Candidates remembered from the last tick.
    pub fn pending(&self) -> &HashSet<BlockHash> {
        &self.previous
    }
}

/// Periodic task feeding confirmed-unused blocks into the feedback channel.
pub struct CleanupScheduler {
    interval: Duration,
    debounce: UnpinDebounce,
}

impl CleanupScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            debounce: UnpinDebounce::new(),
        }
    }

    /// Run until the snapshot publisher or the feedback channel closes.
    ///
    /// The first tick fires one full interval after start, never at time zero.
    pub async fn run(
        mut self,
        mut snapshots: watch::Receiver<Arc<PinnedBlocks>>,
        unpins: UnpinSender,
    ) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        tracing::debug!("snapshot publisher closed, cleanup scheduler stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    tick += 1;
                    let snapshot = snapshots.borrow().clone();
                    let confirmed = {
                        let _span = cleanup_tick_span(tick).entered();
                        self.debounce.observe(&snapshot)
                    };
                    if confirmed.is_empty() {
                        continue;
                    }
                    tracing::debug!(tick, count = confirmed.len(), "requesting unpin");
                    if unpins.send(confirmed).is_err() {
                        tracing::debug!("feedback channel closed, cleanup scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}
