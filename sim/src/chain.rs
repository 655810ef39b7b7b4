//! Synthetic follow-head chain.
//!
//! Produces one canonical block per interval, with an occasional sibling fork
//! block and an occasional runtime upgrade. Finalization trails the best
//! block by a fixed lag and prunes the forks it leaves behind.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use headpin_tracker::{FollowEvent, FollowStream, HeaderFetcher};
use headpin_types::{BlockHash, BlockHeader, BlockNumber};

use crate::config::ChainParams;

/// Height of the block the subscription starts at.
pub const INITIAL_NUMBER: BlockNumber = 1_000;

type HeaderTable = Arc<Mutex<HashMap<BlockHash, BlockHeader>>>;

/// Deterministic hash for the block at `number` on `branch` (0 = canonical).
pub fn block_hash(number: BlockNumber, branch: u8) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&number.to_le_bytes());
    bytes[8] = branch;
    bytes[31] = 0xaa;
    BlockHash::new(bytes)
}

fn every(period: u64, n: u64) -> bool {
    period != 0 && n % period == 0
}

pub struct SyntheticChain {
    params: ChainParams,
    headers: HeaderTable,
    /// Canonical blocks, index 0 is the initial block.
    canonical: Vec<BlockHash>,
    /// Fork blocks not yet pruned, with their heights.
    forks: Vec<(BlockNumber, BlockHash)>,
    finalized: usize,
    queue: VecDeque<FollowEvent>,
    started: bool,
    settled: bool,
}

impl SyntheticChain {
    pub fn new(params: ChainParams) -> Self {
        let initial = block_hash(INITIAL_NUMBER, 0);
        let mut table = HashMap::new();
        table.insert(
            initial,
            BlockHeader::new(INITIAL_NUMBER, block_hash(INITIAL_NUMBER - 1, 0)),
        );
        Self {
            params,
            headers: Arc::new(Mutex::new(table)),
            canonical: vec![initial],
            forks: Vec::new(),
            finalized: 0,
            queue: VecDeque::new(),
            started: false,
            settled: false,
        }
    }

    /// Header lookups served from the blocks this chain has produced.
    pub fn headers(&self) -> SyntheticHeaders {
        SyntheticHeaders {
            table: Arc::clone(&self.headers),
        }
    }

    /// Turn the chain into a follow stream. After the last block the stream
    /// stays open for `settle` so cleanup can catch up, then ends.
    pub fn into_stream(self, settle: Duration) -> FollowStream {
        stream::unfold(self, move |mut chain| async move {
            let event = chain.next_event(settle).await?;
            Some((Ok(event), chain))
        })
        .boxed()
    }

    async fn next_event(&mut self, settle: Duration) -> Option<FollowEvent> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            if !self.started {
                self.started = true;
                // No header: the tracker has to look it up.
                return Some(FollowEvent::Initialized {
                    hash: self.canonical[0],
                    header: None,
                });
            }
            if self.produced() >= self.params.blocks {
                if !self.settled {
                    self.settled = true;
                    tokio::time::sleep(settle).await;
                }
                return None;
            }
            tokio::time::sleep(Duration::from_millis(self.params.block_interval_ms)).await;
            self.produce();
        }
    }

    fn produced(&self) -> u64 {
        self.canonical.len() as u64 - 1
    }

    fn record(&self, hash: BlockHash, number: BlockNumber, parent: BlockHash) {
        if let Ok(mut table) = self.headers.lock() {
            table.insert(hash, BlockHeader::new(number, parent));
        }
    }

    fn produce(&mut self) {
        let n = self.produced() + 1;
        let number = INITIAL_NUMBER + n;
        let parent = self.canonical[self.canonical.len() - 1];
        let hash = block_hash(number, 0);
        self.record(hash, number, parent);
        self.canonical.push(hash);
        self.queue.push_back(FollowEvent::NewBlock {
            parent,
            hash,
            new_runtime: every(self.params.upgrade_every, n),
        });

        if every(self.params.fork_every, n) {
            let fork = block_hash(number, 1);
            self.record(fork, number, parent);
            self.forks.push((number, fork));
            self.queue.push_back(FollowEvent::NewBlock {
                parent,
                hash: fork,
                new_runtime: false,
            });
        }
        self.queue
            .push_back(FollowEvent::BestBlockChanged { hash });

        let Some(target) = n.checked_sub(self.params.finality_lag) else {
            return;
        };
        let target = target as usize;
        if target <= self.finalized {
            return;
        }
        let finalized = self.canonical[self.finalized + 1..=target].to_vec();
        let target_number = INITIAL_NUMBER + target as u64;
        let (pruned, kept): (Vec<_>, Vec<_>) = self
            .forks
            .drain(..)
            .partition(|(number, _)| *number <= target_number);
        self.forks = kept;
        self.finalized = target;
        self.queue.push_back(FollowEvent::Finalized {
            finalized,
            pruned: pruned.into_iter().map(|(_, hash)| hash).collect(),
        });
    }
}

/// [`HeaderFetcher`] backed by the synthetic chain's header table.
#[derive(Clone)]
pub struct SyntheticHeaders {
    table: HeaderTable,
}

#[async_trait]
impl HeaderFetcher for SyntheticHeaders {
    async fn header(&self, hash: BlockHash) -> anyhow::Result<BlockHeader> {
        let table = self
            .table
            .lock()
            .map_err(|_| anyhow::anyhow!("header table poisoned"))?;
        table
            .get(&hash)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown block {hash}"))
    }
}
