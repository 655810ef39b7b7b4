//! Events consumed by the tracker.
//!
//! [`FollowEvent`] is what the node's follow subscription delivers.
//! [`TrackerEvent`] is what the reducer folds: protocol events with their
//! headers resolved, plus usage signals from consumers and unpin requests
//! from the cleanup scheduler.

use headpin_types::{BlockHash, BlockHeader, BlockNumber};

use crate::TrackerError;

/// A block-lifecycle event from the node's follow subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FollowEvent {
    /// First event of a subscription: the finalized block it starts from.
    /// The header may be absent, in which case it is fetched before folding.
    Initialized {
        hash: BlockHash,
        header: Option<BlockHeader>,
    },
    /// A new block on top of an already announced one.
    NewBlock {
        parent: BlockHash,
        hash: BlockHash,
        new_runtime: bool,
    },
    BestBlockChanged {
        hash: BlockHash,
    },
    /// Newly finalized blocks, ancestor first, and the fork blocks that
    /// finalization abandoned.
    Finalized {
        finalized: Vec<BlockHash>,
        pruned: Vec<BlockHash>,
    },
}

impl FollowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::NewBlock { .. } => "new_block",
            Self::BestBlockChanged { .. } => "best_block_changed",
            Self::Finalized { .. } => "finalized",
        }
    }

    /// Hash whose header must be looked up before the event can be folded.
    pub fn missing_header(&self) -> Option<BlockHash> {
        match self {
            Self::Initialized { hash, header: None } => Some(*hash),
            _ => None,
        }
    }

    /// Convert into a foldable event, using `fetched` for an `Initialized`
    /// event that arrived without its header.
    pub fn resolve(self, fetched: Option<BlockHeader>) -> Result<TrackerEvent, TrackerError> {
        Ok(match self {
            Self::Initialized { hash, header } => {
                let header = header.or(fetched).ok_or_else(|| TrackerError::HeaderLookup {
                    hash,
                    reason: "header unavailable".into(),
                })?;
                TrackerEvent::Initialized {
                    hash,
                    number: header.number,
                    parent: header.parent,
                }
            }
            Self::NewBlock {
                parent,
                hash,
                new_runtime,
            } => TrackerEvent::NewBlock {
                parent,
                hash,
                new_runtime,
            },
            Self::BestBlockChanged { hash } => TrackerEvent::BestBlockChanged { hash },
            Self::Finalized { finalized, pruned } => TrackerEvent::Finalized { finalized, pruned },
        })
    }
}

/// Whether a consumer starts or stops using a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageKind {
    Hold,
    Release,
}

/// One step of the reducer's input sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerEvent {
    Initialized {
        hash: BlockHash,
        number: BlockNumber,
        parent: BlockHash,
    },
    NewBlock {
        parent: BlockHash,
        hash: BlockHash,
        new_runtime: bool,
    },
    BestBlockChanged {
        hash: BlockHash,
    },
    Finalized {
        finalized: Vec<BlockHash>,
        pruned: Vec<BlockHash>,
    },
    Usage {
        hash: BlockHash,
        kind: UsageKind,
    },
    Unpin {
        hashes: Vec<BlockHash>,
    },
}

impl TrackerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::NewBlock { .. } => "new_block",
            Self::BestBlockChanged { .. } => "best_block_changed",
            Self::Finalized { .. } => "finalized",
            Self::Usage {
                kind: UsageKind::Hold,
                ..
            } => "hold",
            Self::Usage {
                kind: UsageKind::Release,
                ..
            } => "release",
            Self::Unpin { .. } => "unpin",
        }
    }
}
