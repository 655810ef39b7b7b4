//! Nullable unpin sink — records unpin notifications instead of sending them.

use std::sync::Mutex;

use headpin_tracker::UnpinSink;
use headpin_types::BlockHash;

/// Remembers every batch the tracker asked the node to unpin.
#[derive(Default)]
pub struct RecordingUnpinSink {
    batches: Mutex<Vec<Vec<BlockHash>>>,
}

impl RecordingUnpinSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches, in notification order.
    pub fn batches(&self) -> Vec<Vec<BlockHash>> {
        self.batches.lock().unwrap().clone()
    }

    /// Every unpinned hash, flattened.
    pub fn unpinned(&self) -> Vec<BlockHash> {
        self.batches.lock().unwrap().concat()
    }

    pub fn clear(&self) {
        self.batches.lock().unwrap().clear();
    }
}

impl UnpinSink for RecordingUnpinSink {
    fn notify_unpin(&self, hashes: &[BlockHash]) {
        self.batches.lock().unwrap().push(hashes.to_vec());
    }
}
