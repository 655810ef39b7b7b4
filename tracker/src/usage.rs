//! Hold/release signals from consumers.
//!
//! A consumer that is about to do work against a block (a runtime call, a
//! storage query) holds it first, so the cleanup scheduler leaves it pinned,
//! and releases it when done. Requests travel to the driver through a
//! channel and are folded in order with everything else.

use headpin_types::BlockHash;
use tokio::sync::{mpsc, oneshot};

use crate::{TrackerError, UsageKind};

pub(crate) struct UsageRequest {
    pub hash: BlockHash,
    pub kind: UsageKind,
    /// `None` for fire-and-forget releases from dropped [`BlockHold`]s.
    pub reply: Option<oneshot::Sender<Result<(), TrackerError>>>,
}

/// Cloneable entry point for hold/release requests.
#[derive(Clone)]
pub struct UsageHandle {
    tx: mpsc::UnboundedSender<UsageRequest>,
}

impl UsageHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<UsageRequest>) -> Self {
        Self { tx }
    }

    /// Increment the block's hold count.
    pub async fn hold(&self, hash: BlockHash) -> Result<(), TrackerError> {
        self.request(hash, UsageKind::Hold).await
    }

    /// Decrement the block's hold count. Releasing more than was held is an
    /// error and leaves the count untouched.
    pub async fn release(&self, hash: BlockHash) -> Result<(), TrackerError> {
        self.request(hash, UsageKind::Release).await
    }

    /// Hold `hash` for as long as the returned guard lives.
    pub async fn acquire(&self, hash: BlockHash) -> Result<BlockHold, TrackerError> {
        self.hold(hash).await?;
        Ok(BlockHold {
            hash,
            handle: self.clone(),
            released: false,
        })
    }

    async fn request(&self, hash: BlockHash, kind: UsageKind) -> Result<(), TrackerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(UsageRequest {
                hash,
                kind,
                reply: Some(reply),
            })
            .map_err(|_| TrackerError::Stopped)?;
        rx.await.map_err(|_| TrackerError::Stopped)?
    }
}

/// A hold on a pinned block, released when dropped.
pub struct BlockHold {
    hash: BlockHash,
    handle: UsageHandle,
    released: bool,
}

impl BlockHold {
    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    /// Release now and wait for the tracker to acknowledge.
    pub async fn release(mut self) -> Result<(), TrackerError> {
        self.released = true;
        self.handle.release(self.hash).await
    }
}

impl Drop for BlockHold {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // A closed channel means the pipeline is gone and nothing is pinned.
        let _ = self.handle.tx.send(UsageRequest {
            hash: self.hash,
            kind: UsageKind::Release,
            reply: None,
        });
    }
}
