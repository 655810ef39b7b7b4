//! Error type for parsing the shared types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid block hash: {0}")]
    InvalidHash(String),
}
