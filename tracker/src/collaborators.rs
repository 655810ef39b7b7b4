//! Seams to the parts of the client that live outside the tracker.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use headpin_runtime::RuntimeConstructor;
use headpin_types::{BlockHash, BlockHeader};

use crate::{FollowEvent, TrackerError};

/// The node's follow subscription, already decoded. Ends when the
/// subscription does; an `Err` item aborts the pipeline.
pub type FollowStream = BoxStream<'static, Result<FollowEvent, TrackerError>>;

/// Looks up block headers on the node.
#[async_trait]
pub trait HeaderFetcher: Send + Sync {
    async fn header(&self, hash: BlockHash) -> anyhow::Result<BlockHeader>;
}

/// Tells the node it may release blocks. Fire-and-forget.
pub trait UnpinSink: Send + Sync {
    fn notify_unpin(&self, hashes: &[BlockHash]);
}

/// Everything the pipeline needs from outside.
#[derive(Clone)]
pub struct Collaborators {
    pub headers: Arc<dyn HeaderFetcher>,
    pub runtimes: Arc<dyn RuntimeConstructor>,
    pub unpin_sink: Arc<dyn UnpinSink>,
}
