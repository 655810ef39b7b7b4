//! Fundamental types for headpin.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! block hashes, block headers, runtime identifiers and the parse error for them.

pub mod block;
pub mod error;
pub mod header;
pub mod runtime;

pub use block::{BlockHash, BlockNumber};
pub use error::TypesError;
pub use header::BlockHeader;
pub use runtime::RuntimeId;
