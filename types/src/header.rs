//! The slice of a block header the tracker needs.

use serde::{Deserialize, Serialize};

use crate::{BlockHash, BlockNumber};

/// Height and parent of a block, as returned by the node's header lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: BlockNumber,
    pub parent: BlockHash,
}

impl BlockHeader {
    pub fn new(number: BlockNumber, parent: BlockHash) -> Self {
        Self { number, parent }
    }
}
