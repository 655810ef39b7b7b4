//! The pinned-block graph and the snapshot published after every fold.
//!
//! Nodes live in a hash-keyed arena; parent and child links are hashes, so
//! removing a block is a single map deletion plus one edit of its parent's
//! child set. A node's parent may be missing from the map when it was never
//! announced (the initial block) or has already been unpinned.

use std::collections::{BTreeSet, HashMap, HashSet};

use headpin_runtime::RuntimeDescriptor;
use headpin_types::{BlockHash, BlockNumber, RuntimeId};

/// One block the node is keeping pinned for us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockNode {
    pub hash: BlockHash,
    pub number: BlockNumber,
    pub parent: BlockHash,
    pub children: BTreeSet<BlockHash>,
    pub runtime: RuntimeId,
    /// Outstanding holds from consumers.
    pub ref_count: usize,
}

/// Immutable view of the tracked block tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PinnedBlocks {
    pub best: BlockHash,
    pub finalized: BlockHash,
    pub blocks: HashMap<BlockHash, BlockNode>,
    pub runtimes: HashMap<RuntimeId, RuntimeDescriptor>,
    /// Runtime active at `finalized`; `None` until initialized.
    pub finalized_runtime: Option<RuntimeDescriptor>,
    /// Fork blocks abandoned by finalization that are still pinned.
    pub pruned: BTreeSet<BlockHash>,
}

impl PinnedBlocks {
    pub fn is_initialized(&self) -> bool {
        self.finalized_runtime.is_some()
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&BlockNode> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Descriptor of the runtime a pinned block executes under.
    pub fn runtime_of(&self, hash: &BlockHash) -> Option<&RuntimeDescriptor> {
        let node = self.blocks.get(hash)?;
        self.runtimes.get(&node.runtime)
    }

    /// Tracked ancestors of `finalized`, nearest first. Stops at the first
    /// parent that is no longer tracked.
    pub fn finalized_ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            blocks: &self.blocks,
            next: self.blocks.get(&self.finalized).map(|node| node.parent),
        }
    }

    /// Blocks on the path from `best` back to `finalized`, both included.
    ///
    /// None of these may be unpinned while they hold those roles.
    pub fn best_chain(&self) -> HashSet<BlockHash> {
        let mut chain = HashSet::new();
        chain.insert(self.finalized);
        let mut cursor = self.blocks.get(&self.best);
        while let Some(node) = cursor {
            if !chain.insert(node.hash) || node.hash == self.finalized {
                break;
            }
            cursor = self.blocks.get(&node.parent);
        }
        chain
    }

    /// Oldest-first run of finalized ancestors accepted by `removable`.
    ///
    /// The run starts at the earliest tracked ancestor and ends at the first
    /// one `removable` rejects, so removing it never leaves a tracked block
    /// above a hole in the chain.
    pub fn releasable_ancestors(
        &self,
        mut removable: impl FnMut(&BlockNode) -> bool,
    ) -> Vec<BlockHash> {
        let chain: Vec<&BlockNode> = self.finalized_ancestors().collect();
        chain
            .into_iter()
            .rev()
            .take_while(|node| removable(*node))
            .map(|node| node.hash)
            .collect()
    }

    /// The subset of `hashes` that can be unpinned right now: tracked, not
    /// held, and not on the finalized-to-best path. A finalized ancestor is
    /// only kept if every tracked ancestor above it goes too. Order is
    /// preserved and duplicates are dropped.
    pub fn unpinnable(&self, hashes: &[BlockHash]) -> Vec<BlockHash> {
        let protected = self.best_chain();
        let requested: HashSet<BlockHash> = hashes.iter().copied().collect();
        let ancestors: HashSet<BlockHash> =
            self.finalized_ancestors().map(|node| node.hash).collect();
        let releasable: HashSet<BlockHash> = self
            .releasable_ancestors(|node| node.ref_count == 0 && requested.contains(&node.hash))
            .into_iter()
            .collect();
        let mut seen = HashSet::new();
        hashes
            .iter()
            .copied()
            .filter(|hash| !protected.contains(hash))
            .filter(|hash| self.blocks.get(hash).is_some_and(|node| node.ref_count == 0))
            .filter(|hash| !ancestors.contains(hash) || releasable.contains(hash))
            .filter(|hash| seen.insert(*hash))
            .collect()
    }
}

/// Iterator over the tracked ancestors of the finalized block.
pub struct Ancestors<'a> {
    blocks: &'a HashMap<BlockHash, BlockNode>,
    next: Option<BlockHash>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a BlockNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.blocks.get(&self.next?)?;
        self.next = Some(node.parent);
        Some(node)
    }
}
