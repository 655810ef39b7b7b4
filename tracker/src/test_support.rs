//! Shared fixtures for the unit tests.

use async_trait::async_trait;
use headpin_runtime::{RuntimeConstructor, RuntimeMetadata};
use headpin_types::BlockHash;

pub(crate) fn hash(n: u8) -> BlockHash {
    BlockHash::new([n; 32])
}

/// Resolves every runtime immediately.
pub(crate) struct InstantRuntimes;

#[async_trait]
impl RuntimeConstructor for InstantRuntimes {
    async fn construct(&self, block: BlockHash) -> anyhow::Result<RuntimeMetadata> {
        Ok(RuntimeMetadata {
            spec_name: "test".into(),
            spec_version: u32::from(block.as_bytes()[0]),
            metadata: Vec::new(),
        })
    }
}
