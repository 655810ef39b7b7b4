//! Nullable header fetcher — serves headers from a fixed table.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use headpin_tracker::HeaderFetcher;
use headpin_types::{BlockHash, BlockHeader};

/// Answers header lookups from a preloaded map.
///
/// Unknown hashes produce an error; a "hanging" fetcher never answers, for
/// exercising timeouts.
#[derive(Default)]
pub struct NullHeaderFetcher {
    headers: HashMap<BlockHash, BlockHeader>,
    hang: bool,
    calls: Mutex<Vec<BlockHash>>,
}

impl NullHeaderFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to serve.
    pub fn with_header(mut self, hash: BlockHash, header: BlockHeader) -> Self {
        self.headers.insert(hash, header);
        self
    }

    /// A fetcher whose lookups never complete.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Every hash looked up so far, in order.
    pub fn calls(&self) -> Vec<BlockHash> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HeaderFetcher for NullHeaderFetcher {
    async fn header(&self, hash: BlockHash) -> anyhow::Result<BlockHeader> {
        self.calls.lock().unwrap().push(hash);
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.headers
            .get(&hash)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no header for {hash}"))
    }
}
