//! Nullable runtime constructor — deterministic metadata, optional failures.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use headpin_runtime::{RuntimeConstructor, RuntimeMetadata};
use headpin_types::BlockHash;
use tokio::sync::watch;

/// Builds metadata derived from the block hash.
///
/// By default every build succeeds at once. Builds for hashes passed to
/// [`failing_for`](Self::failing_for) fail; a gated constructor holds every
/// build until its [`RuntimeGate`] is opened.
#[derive(Default)]
pub struct NullRuntimeConstructor {
    failing: HashSet<BlockHash>,
    gate: Option<watch::Receiver<bool>>,
    constructed: Mutex<Vec<BlockHash>>,
}

impl NullRuntimeConstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make builds for these blocks fail.
    pub fn failing_for(mut self, hashes: impl IntoIterator<Item = BlockHash>) -> Self {
        self.failing.extend(hashes);
        self
    }

    /// Hold builds until the returned gate opens.
    pub fn gated() -> (Self, RuntimeGate) {
        let (tx, rx) = watch::channel(false);
        let constructor = Self {
            gate: Some(rx),
            ..Self::default()
        };
        (constructor, RuntimeGate(Arc::new(tx)))
    }

    /// Blocks whose builds have started, in order.
    pub fn constructed(&self) -> Vec<BlockHash> {
        self.constructed.lock().unwrap().clone()
    }

    /// Metadata this constructor produces for `block`.
    pub fn metadata_for(block: &BlockHash) -> RuntimeMetadata {
        RuntimeMetadata {
            spec_name: "null-runtime".into(),
            spec_version: u32::from(block.as_bytes()[0]),
            metadata: block.as_bytes()[..4].to_vec(),
        }
    }
}

#[async_trait]
impl RuntimeConstructor for NullRuntimeConstructor {
    async fn construct(&self, block: BlockHash) -> anyhow::Result<RuntimeMetadata> {
        self.constructed.lock().unwrap().push(block);
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            while !*gate.borrow_and_update() {
                gate.changed()
                    .await
                    .map_err(|_| anyhow::anyhow!("runtime gate dropped"))?;
            }
        }
        if self.failing.contains(&block) {
            anyhow::bail!("cannot decode metadata at {block}");
        }
        Ok(Self::metadata_for(&block))
    }
}

/// Releases the builds of a gated [`NullRuntimeConstructor`].
#[derive(Clone)]
pub struct RuntimeGate(Arc<watch::Sender<bool>>);

impl RuntimeGate {
    pub fn open(&self) {
        self.0.send_replace(true);
    }
}
