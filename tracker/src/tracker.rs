//! The reducer: folds [`TrackerEvent`]s into [`PinnedBlocks`] snapshots.
//!
//! Each call to [`BlockTracker::apply`] works on a copy of the current
//! snapshot and publishes it only if the event was valid, so readers never
//! observe a half-applied event and a rejected event leaves no trace.

use std::sync::Arc;

use headpin_runtime::{RuntimeConstructor, RuntimeRegistry};
use headpin_types::{BlockHash, BlockNumber};

use crate::{BlockNode, PinnedBlocks, TrackerError, TrackerEvent, UsageKind};

/// Single-writer owner of the pinned-block state and its runtime registry.
pub struct BlockTracker {
    registry: RuntimeRegistry,
    state: Arc<PinnedBlocks>,
}

impl BlockTracker {
    pub fn new(constructor: Arc<dyn RuntimeConstructor>) -> Self {
        Self {
            registry: RuntimeRegistry::new(constructor),
            state: Arc::new(PinnedBlocks::default()),
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<PinnedBlocks> {
        Arc::clone(&self.state)
    }

    pub fn registry(&self) -> &RuntimeRegistry {
        &self.registry
    }

    /// Fold one event. On error the published snapshot is unchanged.
    ///
    /// Each fold copies the block and runtime maps, so its cost grows with
    /// the number of pinned blocks, which the node caps.
    pub fn apply(&mut self, event: TrackerEvent) -> Result<Arc<PinnedBlocks>, TrackerError> {
        let mut next = PinnedBlocks::clone(&self.state);
        match event {
            TrackerEvent::Initialized {
                hash,
                number,
                parent,
            } => self.initialize(&mut next, hash, number, parent)?,
            TrackerEvent::NewBlock {
                parent,
                hash,
                new_runtime,
            } => self.new_block(&mut next, parent, hash, new_runtime)?,
            TrackerEvent::BestBlockChanged { hash } => {
                if !next.contains(&hash) {
                    return Err(TrackerError::UnknownBlock(hash));
                }
                next.best = hash;
            }
            TrackerEvent::Finalized { finalized, pruned } => {
                Self::finalize(&mut next, &finalized, &pruned)?
            }
            TrackerEvent::Usage { hash, kind } => Self::usage(&mut next, hash, kind)?,
            TrackerEvent::Unpin { hashes } => self.unpin(&mut next, &hashes),
        }
        self.state = Arc::new(next);
        Ok(Arc::clone(&self.state))
    }

    /// Drop every runtime descriptor. Called once the subscription is over.
    pub fn teardown(&mut self) {
        tracing::info!(
            blocks = self.state.len(),
            runtimes = self.registry.len(),
            "tearing down pinned-block state"
        );
        self.registry.clear();
    }

    fn initialize(
        &mut self,
        next: &mut PinnedBlocks,
        hash: BlockHash,
        number: BlockNumber,
        parent: BlockHash,
    ) -> Result<(), TrackerError> {
        if next.is_initialized() {
            return Err(TrackerError::AlreadyInitialized(next.finalized));
        }
        let runtime = self.registry.get_or_create(hash);
        *next = PinnedBlocks::default();
        next.blocks.insert(
            hash,
            BlockNode {
                hash,
                number,
                parent,
                children: Default::default(),
                runtime: runtime.id(),
                ref_count: 0,
            },
        );
        next.runtimes.insert(runtime.id(), runtime.clone());
        next.best = hash;
        next.finalized = hash;
        next.finalized_runtime = Some(runtime);
        tracing::info!(%hash, number, "follow subscription initialized");
        Ok(())
    }

    fn new_block(
        &mut self,
        next: &mut PinnedBlocks,
        parent: BlockHash,
        hash: BlockHash,
        new_runtime: bool,
    ) -> Result<(), TrackerError> {
        if !next.is_initialized() {
            return Err(TrackerError::NotInitialized);
        }
        if next.contains(&hash) {
            return Err(TrackerError::DuplicateBlock(hash));
        }
        let Some(parent_node) = next.blocks.get_mut(&parent) else {
            return Err(TrackerError::UnknownParent { parent, hash });
        };
        parent_node.children.insert(hash);
        let number = parent_node.number + 1;
        let parent_runtime = parent_node.runtime;

        let runtime = if new_runtime {
            let descriptor = self.registry.get_or_create(hash);
            let id = descriptor.id();
            next.runtimes.insert(id, descriptor);
            tracing::debug!(%hash, number, runtime = %id, "block introduces a new runtime");
            id
        } else {
            self.registry.add_block(hash, parent_runtime);
            parent_runtime
        };

        next.blocks.insert(
            hash,
            BlockNode {
                hash,
                number,
                parent,
                children: Default::default(),
                runtime,
                ref_count: 0,
            },
        );
        Ok(())
    }

    fn finalize(
        next: &mut PinnedBlocks,
        finalized: &[BlockHash],
        pruned: &[BlockHash],
    ) -> Result<(), TrackerError> {
        if !next.is_initialized() {
            return Err(TrackerError::NotInitialized);
        }
        if let Some(missing) = finalized.iter().find(|h| !next.contains(h)) {
            return Err(TrackerError::UnknownBlock(*missing));
        }
        if let Some(last) = finalized.last() {
            next.finalized = *last;
            let runtime = next.blocks[last].runtime;
            if let Some(descriptor) = next.runtimes.get(&runtime) {
                next.finalized_runtime = Some(descriptor.clone());
            }
        }
        for hash in pruned {
            if next.contains(hash) {
                next.pruned.insert(*hash);
            }
        }
        Ok(())
    }

    fn usage(next: &mut PinnedBlocks, hash: BlockHash, kind: UsageKind) -> Result<(), TrackerError> {
        let Some(node) = next.blocks.get_mut(&hash) else {
            return Err(TrackerError::NotPinned(hash));
        };
        match kind {
            UsageKind::Hold => node.ref_count += 1,
            UsageKind::Release => {
                node.ref_count = node
                    .ref_count
                    .checked_sub(1)
                    .ok_or(TrackerError::ReleaseWithoutHold(hash))?;
            }
        }
        Ok(())
    }

    fn unpin(&mut self, next: &mut PinnedBlocks, hashes: &[BlockHash]) {
        let mut removed = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let Some(node) = next.blocks.remove(hash) else {
                continue;
            };
            if let Some(parent) = next.blocks.get_mut(&node.parent) {
                parent.children.remove(hash);
            }
            next.pruned.remove(hash);
            removed.push(*hash);
        }

        for (runtime, remaining) in self.registry.delete_blocks(&removed) {
            if remaining == 0 {
                self.registry.destroy(runtime);
                next.runtimes.remove(&runtime);
            }
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "blocks unpinned");
        }
    }
}
