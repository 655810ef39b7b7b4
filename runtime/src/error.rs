use headpin_types::RuntimeId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("failed to construct {id}: {reason}")]
    Construction { id: RuntimeId, reason: String },

    #[error("{0} was discarded before it finished loading")]
    Discarded(RuntimeId),
}
