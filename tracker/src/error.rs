use headpin_types::BlockHash;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    // ── Protocol-consistency violations (fatal) ─────────────────────────
    #[error("tracker already initialized at {0}")]
    AlreadyInitialized(BlockHash),

    #[error("event received before the subscription was initialized")]
    NotInitialized,

    #[error("parent {parent} of new block {hash} is not pinned")]
    UnknownParent { parent: BlockHash, hash: BlockHash },

    #[error("block {0} is not pinned")]
    UnknownBlock(BlockHash),

    #[error("block {0} was announced twice")]
    DuplicateBlock(BlockHash),

    #[error("follow subscription failed: {0}")]
    Subscription(String),

    #[error("header lookup for {hash} failed: {reason}")]
    HeaderLookup { hash: BlockHash, reason: String },

    #[error("cleanup scheduler stopped: {0}")]
    CleanupStopped(String),

    // ── Caller errors (local) ───────────────────────────────────────────
    #[error("release of {0} without a matching hold")]
    ReleaseWithoutHold(BlockHash),

    #[error("usage reported for block {0}, which is not pinned")]
    NotPinned(BlockHash),

    #[error("tracker pipeline has stopped")]
    Stopped,

    #[error("config error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Whether the error ends the subscription.
    ///
    /// Fatal errors mean the upstream event stream broke its ordering
    /// contract (or failed outright) and the snapshot can't be repaired
    /// locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInitialized(_)
                | Self::NotInitialized
                | Self::UnknownParent { .. }
                | Self::UnknownBlock(_)
                | Self::DuplicateBlock(_)
                | Self::Subscription(_)
                | Self::HeaderLookup { .. }
                | Self::CleanupStopped(_)
        )
    }
}
