//! Registry of live runtime descriptors and the blocks that use them.
//!
//! The registry is owned by the tracker's reducer and only mutated from inside
//! fold steps. Builds run on spawned tasks, so creating a descriptor never
//! blocks the fold; destroying one aborts its build.

use std::collections::HashMap;
use std::sync::Arc;

use headpin_types::{BlockHash, RuntimeId};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::Instrument;

use crate::{RuntimeConstructor, RuntimeDescriptor, RuntimeError, RuntimeStatus};

struct RuntimeEntry {
    descriptor: RuntimeDescriptor,
    /// Number of tracked blocks executing under this runtime.
    usages: usize,
    build: AbortHandle,
}

/// Shares one descriptor per runtime and counts the blocks referencing it.
pub struct RuntimeRegistry {
    constructor: Arc<dyn RuntimeConstructor>,
    runtimes: HashMap<RuntimeId, RuntimeEntry>,
    /// Which runtime each registered block uses.
    blocks: HashMap<BlockHash, RuntimeId>,
}

impl RuntimeRegistry {
    pub fn new(constructor: Arc<dyn RuntimeConstructor>) -> Self {
        Self {
            constructor,
            runtimes: HashMap::new(),
            blocks: HashMap::new(),
        }
    }

    /// Descriptor for the runtime introduced at `hash`, creating it if needed.
    ///
    /// `hash` is registered as a user of the returned runtime. Must be called
    /// from within a tokio runtime.
    pub fn get_or_create(&mut self, hash: BlockHash) -> RuntimeDescriptor {
        let id = RuntimeId::new(hash);
        if !self.runtimes.contains_key(&id) {
            let entry = self.spawn_build(id);
            self.runtimes.insert(id, entry);
            tracing::debug!(runtime = %id, "runtime build started");
        }
        self.add_block(hash, id);
        self.runtimes[&id].descriptor.clone()
    }

    /// Record that `hash` executes under `runtime`.
    ///
    /// Returns false if the runtime is unknown or the block is already registered.
    pub fn add_block(&mut self, hash: BlockHash, runtime: RuntimeId) -> bool {
        let Some(entry) = self.runtimes.get_mut(&runtime) else {
            tracing::warn!(%hash, %runtime, "block adopted an unknown runtime");
            return false;
        };
        if self.blocks.contains_key(&hash) {
            return false;
        }
        self.blocks.insert(hash, runtime);
        entry.usages += 1;
        true
    }

    /// Release the runtimes used by blocks that are about to be removed.
    ///
    /// Returns the remaining usage count of every runtime touched, so the
    /// caller can destroy the ones that dropped to zero. Unregistered hashes
    /// are skipped.
    pub fn delete_blocks<'a>(
        &mut self,
        hashes: impl IntoIterator<Item = &'a BlockHash>,
    ) -> HashMap<RuntimeId, usize> {
        let mut remaining = HashMap::new();
        for hash in hashes {
            let Some(id) = self.blocks.remove(hash) else {
                continue;
            };
            if let Some(entry) = self.runtimes.get_mut(&id) {
                entry.usages = entry.usages.saturating_sub(1);
                remaining.insert(id, entry.usages);
            }
        }
        remaining
    }

    /// Drop a runtime and abort its build if still running.
    pub fn destroy(&mut self, runtime: RuntimeId) -> Option<RuntimeDescriptor> {
        let entry = self.runtimes.remove(&runtime)?;
        entry.build.abort();
        if entry.usages > 0 {
            self.blocks.retain(|_, id| *id != runtime);
        }
        tracing::debug!(%runtime, "runtime destroyed");
        Some(entry.descriptor)
    }

    /// Destroy every runtime. Used when the subscription ends.
    pub fn clear(&mut self) {
        for (_, entry) in self.runtimes.drain() {
            entry.build.abort();
        }
        self.blocks.clear();
    }

    pub fn get(&self, runtime: &RuntimeId) -> Option<&RuntimeDescriptor> {
        self.runtimes.get(runtime).map(|entry| &entry.descriptor)
    }

    /// Number of registered blocks using `runtime` (0 if unknown).
    pub fn usages(&self, runtime: &RuntimeId) -> usize {
        self.runtimes.get(runtime).map_or(0, |entry| entry.usages)
    }

    pub fn runtime_of(&self, hash: &BlockHash) -> Option<RuntimeId> {
        self.blocks.get(hash).copied()
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    fn spawn_build(&self, id: RuntimeId) -> RuntimeEntry {
        let (tx, rx) = watch::channel(RuntimeStatus::Loading);
        let constructor = Arc::clone(&self.constructor);
        let span = tracing::info_span!("runtime_build", runtime = %id);
        let task = tokio::spawn(
            async move {
                let status = match constructor.construct(id.introduced_at()).await {
                    Ok(metadata) => {
                        tracing::debug!(
                            spec = %metadata.spec_name,
                            version = metadata.spec_version,
                            "runtime ready"
                        );
                        RuntimeStatus::Ready(Arc::new(metadata))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "runtime construction failed");
                        RuntimeStatus::Failed(RuntimeError::Construction {
                            id,
                            reason: format!("{e:#}"),
                        })
                    }
                };
                // No receivers left means the descriptor is gone already.
                let _ = tx.send(status);
            }
            .instrument(span),
        );
        RuntimeEntry {
            descriptor: RuntimeDescriptor::new(id, rx),
            usages: 0,
            build: task.abort_handle(),
        }
    }
}

impl Drop for RuntimeRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeMetadata;
    use async_trait::async_trait;

    fn hash(n: u8) -> BlockHash {
        BlockHash::new([n; 32])
    }

    struct Instant;

    #[async_trait]
    impl RuntimeConstructor for Instant {
        async fn construct(&self, block: BlockHash) -> anyhow::Result<RuntimeMetadata> {
            Ok(RuntimeMetadata {
                spec_name: "test".into(),
                spec_version: block.as_bytes()[0] as u32,
                metadata: vec![],
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl RuntimeConstructor for Broken {
        async fn construct(&self, _block: BlockHash) -> anyhow::Result<RuntimeMetadata> {
            anyhow::bail!("metadata blob is truncated")
        }
    }

    struct Never;

    #[async_trait]
    impl RuntimeConstructor for Never {
        async fn construct(&self, _block: BlockHash) -> anyhow::Result<RuntimeMetadata> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn creating_block_counts_as_first_user() {
        let mut registry = RuntimeRegistry::new(Arc::new(Instant));
        let descriptor = registry.get_or_create(hash(1));

        assert_eq!(descriptor.id(), RuntimeId::new(hash(1)));
        assert_eq!(registry.usages(&descriptor.id()), 1);
        assert_eq!(registry.runtime_of(&hash(1)), Some(descriptor.id()));

        let metadata = descriptor.ready().await.expect("builds");
        assert_eq!(metadata.spec_version, 1);
        assert!(descriptor.is_ready());
    }

    #[tokio::test]
    async fn get_or_create_reuses_existing_descriptor() {
        let mut registry = RuntimeRegistry::new(Arc::new(Instant));
        let first = registry.get_or_create(hash(1));
        let second = registry.get_or_create(hash(1));
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.usages(&first.id()), 1);
    }

    #[tokio::test]
    async fn inherited_blocks_share_and_release_usage() {
        let mut registry = RuntimeRegistry::new(Arc::new(Instant));
        let runtime = registry.get_or_create(hash(1)).id();
        assert!(registry.add_block(hash(2), runtime));
        assert!(registry.add_block(hash(3), runtime));
        assert!(!registry.add_block(hash(3), runtime));
        assert_eq!(registry.usages(&runtime), 3);

        let remaining = registry.delete_blocks(&[hash(2), hash(3)]);
        assert_eq!(remaining.get(&runtime), Some(&1));

        let remaining = registry.delete_blocks(&[hash(1), hash(9)]);
        assert_eq!(remaining.get(&runtime), Some(&0));
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn delete_blocks_reports_each_runtime() {
        let mut registry = RuntimeRegistry::new(Arc::new(Instant));
        let a = registry.get_or_create(hash(1)).id();
        let b = registry.get_or_create(hash(2)).id();
        registry.add_block(hash(3), b);

        let remaining = registry.delete_blocks(&[hash(1), hash(3)]);
        assert_eq!(remaining.get(&a), Some(&0));
        assert_eq!(remaining.get(&b), Some(&1));
    }

    #[tokio::test]
    async fn add_block_to_unknown_runtime_is_refused() {
        let mut registry = RuntimeRegistry::new(Arc::new(Instant));
        assert!(!registry.add_block(hash(2), RuntimeId::new(hash(1))));
        assert_eq!(registry.runtime_of(&hash(2)), None);
    }

    #[tokio::test]
    async fn failed_build_is_reported_on_descriptor() {
        let mut registry = RuntimeRegistry::new(Arc::new(Broken));
        let descriptor = registry.get_or_create(hash(4));

        let err = descriptor.ready().await.unwrap_err();
        match err {
            RuntimeError::Construction { id, reason } => {
                assert_eq!(id, RuntimeId::new(hash(4)));
                assert!(reason.contains("truncated"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The registry still tracks it; failures don't unpin anything.
        assert_eq!(registry.usages(&descriptor.id()), 1);
    }

    #[tokio::test]
    async fn destroy_discards_pending_build() {
        let mut registry = RuntimeRegistry::new(Arc::new(Never));
        let descriptor = registry.get_or_create(hash(5));
        assert!(matches!(descriptor.status(), RuntimeStatus::Loading));

        let removed = registry.destroy(descriptor.id()).expect("was registered");
        assert_eq!(removed, descriptor);
        assert!(registry.is_empty());
        assert_eq!(registry.runtime_of(&hash(5)), None);

        let err = descriptor.ready().await.unwrap_err();
        assert_eq!(err, RuntimeError::Discarded(descriptor.id()));
    }

    #[tokio::test]
    async fn clear_destroys_everything() {
        let mut registry = RuntimeRegistry::new(Arc::new(Never));
        let a = registry.get_or_create(hash(1));
        registry.get_or_create(hash(2));
        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.usages(&a.id()), 0);
        assert!(a.ready().await.is_err());
    }
}
