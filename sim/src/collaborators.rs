//! Simulated node services: runtime builds and unpin notifications.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use headpin_runtime::{RuntimeConstructor, RuntimeMetadata};
use headpin_tracker::UnpinSink;
use headpin_types::BlockHash;

/// Builds runtime metadata after a fixed delay.
pub struct SyntheticRuntimes {
    build_time: Duration,
    built: AtomicUsize,
}

impl SyntheticRuntimes {
    pub fn new(build_time: Duration) -> Self {
        Self {
            build_time,
            built: AtomicUsize::new(0),
        }
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RuntimeConstructor for SyntheticRuntimes {
    async fn construct(&self, block: BlockHash) -> anyhow::Result<RuntimeMetadata> {
        tokio::time::sleep(self.build_time).await;
        let mut height = [0u8; 8];
        height.copy_from_slice(&block.as_bytes()[..8]);
        self.built.fetch_add(1, Ordering::Relaxed);
        Ok(RuntimeMetadata {
            spec_name: "synthetic".into(),
            spec_version: u64::from_le_bytes(height) as u32,
            metadata: block.as_bytes().to_vec(),
        })
    }
}

/// Stands in for the node's unpin call: logs and counts.
#[derive(Default)]
pub struct CountingUnpinSink {
    batches: AtomicUsize,
    blocks: AtomicUsize,
}

impl CountingUnpinSink {
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn blocks(&self) -> usize {
        self.blocks.load(Ordering::Relaxed)
    }
}

impl UnpinSink for CountingUnpinSink {
    fn notify_unpin(&self, hashes: &[BlockHash]) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.blocks.fetch_add(hashes.len(), Ordering::Relaxed);
        tracing::info!(count = hashes.len(), first = ?hashes.first(), "unpin");
    }
}
