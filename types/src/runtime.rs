//! Runtime identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BlockHash;

/// Identifies a runtime by the hash of the block that introduced it.
///
/// Every block that inherits the runtime (no code upgrade in between) shares
/// the same id, so one descriptor serves the whole run of blocks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuntimeId(BlockHash);

impl RuntimeId {
    pub fn new(introduced_at: BlockHash) -> Self {
        Self(introduced_at)
    }

    /// The block whose runtime upgrade (or initial state) created this runtime.
    pub fn introduced_at(&self) -> BlockHash {
        self.0
    }
}

impl From<BlockHash> for RuntimeId {
    fn from(hash: BlockHash) -> Self {
        Self(hash)
    }
}

impl fmt::Debug for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeId({:?})", self.0)
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime@{}", self.0)
    }
}
