//! Runtime descriptors and their asynchronously resolved metadata.

use std::fmt;
use std::sync::Arc;

use headpin_types::RuntimeId;
use tokio::sync::watch;

use crate::RuntimeError;

/// Decoded runtime metadata for one code version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeMetadata {
    pub spec_name: String,
    pub spec_version: u32,
    /// Encoded metadata blob as delivered by the node.
    pub metadata: Vec<u8>,
}

/// Progress of a descriptor's background build.
#[derive(Clone, Debug)]
pub enum RuntimeStatus {
    Loading,
    Ready(Arc<RuntimeMetadata>),
    Failed(RuntimeError),
}

/// Handle to a runtime shared by a run of blocks.
///
/// Cloning is cheap; all clones observe the same build. Equality is by id.
#[derive(Clone)]
pub struct RuntimeDescriptor {
    id: RuntimeId,
    status: watch::Receiver<RuntimeStatus>,
}

impl RuntimeDescriptor {
    pub(crate) fn new(id: RuntimeId, status: watch::Receiver<RuntimeStatus>) -> Self {
        Self { id, status }
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    /// Current build status, without waiting.
    pub fn status(&self) -> RuntimeStatus {
        self.status.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.status.borrow(), RuntimeStatus::Ready(_))
    }

    /// Wait until the metadata is decoded.
    ///
    /// Returns [`RuntimeError::Discarded`] if the registry destroyed the
    /// descriptor before its build finished.
    pub async fn ready(&self) -> Result<Arc<RuntimeMetadata>, RuntimeError> {
        let mut status = self.status.clone();
        loop {
            {
                let current = status.borrow_and_update();
                match &*current {
                    RuntimeStatus::Ready(metadata) => return Ok(Arc::clone(metadata)),
                    RuntimeStatus::Failed(err) => return Err(err.clone()),
                    RuntimeStatus::Loading => {}
                }
            }
            status
                .changed()
                .await
                .map_err(|_| RuntimeError::Discarded(self.id))?;
        }
    }
}

impl PartialEq for RuntimeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuntimeDescriptor {}

impl fmt::Debug for RuntimeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeDescriptor")
            .field("id", &self.id)
            .field("status", &*self.status.borrow())
            .finish()
    }
}
