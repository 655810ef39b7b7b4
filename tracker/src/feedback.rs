//! Feedback channel from the cleanup scheduler back into the reducer.
//!
//! The scheduler decides what to unpin by reading snapshots the reducer
//! produced, and the reducer must fold that decision like any other event.
//! The channel is created before the pipeline starts, so the scheduler can
//! write to it regardless of when the driver first reads.

use headpin_types::BlockHash;
use tokio::sync::mpsc;

use crate::TrackerError;

/// Blocks found unused on two consecutive cleanup ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnpinRequest {
    pub hashes: Vec<BlockHash>,
}

/// Create a connected sender/receiver pair.
pub fn unpin_channel() -> (UnpinSender, UnpinReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UnpinSender(tx), UnpinReceiver(rx))
}

#[derive(Clone, Debug)]
pub struct UnpinSender(mpsc::UnboundedSender<UnpinRequest>);

impl UnpinSender {
    /// Queue a request. Fails only once the receiving side is gone.
    pub fn send(&self, hashes: Vec<BlockHash>) -> Result<(), TrackerError> {
        self.0
            .send(UnpinRequest { hashes })
            .map_err(|_| TrackerError::Stopped)
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

#[derive(Debug)]
pub struct UnpinReceiver(mpsc::UnboundedReceiver<UnpinRequest>);

impl UnpinReceiver {
    pub async fn recv(&mut self) -> Option<UnpinRequest> {
        self.0.recv().await
    }
}
