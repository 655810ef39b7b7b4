//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator the tracker talks to (follow stream, header lookup,
//! runtime construction, node unpin calls) is a trait. This crate provides
//! test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what was asked of them for assertions
//!
//! Usage: hand these to `spawn_tracker` in place of the real node client.

pub mod follow;
pub mod headers;
pub mod runtime;
pub mod unpin;

pub use follow::{null_follow_source, FollowSender};
pub use headers::NullHeaderFetcher;
pub use runtime::{NullRuntimeConstructor, RuntimeGate};
pub use unpin::RecordingUnpinSink;
