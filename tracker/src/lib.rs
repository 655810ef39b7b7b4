//! Client-side pinned-block tracking for a node's "follow head" subscription.
//!
//! The node keeps every block it announces pinned until the client unpins
//! it, and ends the subscription if too many pile up. This crate:
//! - Folds follow events, consumer holds/releases and unpin requests into a
//!   block-tree snapshot ([`PinnedBlocks`]) via a single-writer reducer
//! - Shares and reference-counts runtime descriptors across blocks
//! - Periodically unpins blocks behind the finalized head (and abandoned
//!   forks) once they have been unused for two cleanup ticks
//! - Publishes every snapshot on a watch channel for consumers

pub mod cleanup;
pub mod collaborators;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod feedback;
pub mod logging;
pub mod metrics;
pub mod pinned;
pub mod shutdown;
pub mod tracing_spans;
pub mod tracker;
pub mod usage;

#[cfg(test)]
mod test_support;

pub use cleanup::{unpin_candidates, CleanupScheduler, UnpinDebounce};
pub use collaborators::{Collaborators, FollowStream, HeaderFetcher, UnpinSink};
pub use config::TrackerConfig;
pub use driver::{spawn_tracker, TrackerHandle};
pub use error::TrackerError;
pub use event::{FollowEvent, TrackerEvent, UsageKind};
pub use feedback::{unpin_channel, UnpinReceiver, UnpinRequest, UnpinSender};
pub use logging::{init_logging, LogFormat};
pub use metrics::TrackerMetrics;
pub use pinned::{Ancestors, BlockNode, PinnedBlocks};
pub use shutdown::ShutdownController;
pub use tracker::BlockTracker;
pub use usage::{BlockHold, UsageHandle};
