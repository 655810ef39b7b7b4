//! Runtime registry for the headpin tracker.
//!
//! A runtime descriptor is created for the block that introduced a runtime
//! (the initial finalized block, or a block announcing a code upgrade) and is
//! shared by every descendant that inherits it. Decoding the metadata happens
//! in the background; the descriptor is usable for identity and reference
//! counting straight away.

pub mod constructor;
pub mod descriptor;
pub mod error;
pub mod registry;

pub use constructor::RuntimeConstructor;
pub use descriptor::{RuntimeDescriptor, RuntimeMetadata, RuntimeStatus};
pub use error::RuntimeError;
pub use registry::RuntimeRegistry;
