//! Seam to the external metadata decoder.

use async_trait::async_trait;
use headpin_types::BlockHash;

use crate::RuntimeMetadata;

/// Builds the runtime metadata active at a given block.
///
/// Implementations fetch and decode whatever the node exposes for the block;
/// the registry only awaits the result.
#[async_trait]
pub trait RuntimeConstructor: Send + Sync {
    async fn construct(&self, block: BlockHash) -> anyhow::Result<RuntimeMetadata>;
}
