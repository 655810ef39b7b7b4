//! Pre-built [`tracing::Span`] constructors for tracker operations.
//!
//! Consistent span names and field sets make it easy to filter and correlate
//! a subscription's activity in any tracing backend.

use tracing::{debug_span, info_span, Span};

use headpin_types::BlockHash;

/// Span covering the whole lifetime of one follow subscription.
pub fn subscription_span() -> Span {
    info_span!("follow_subscription")
}

/// Span covering the fold of a single event into the snapshot.
pub fn fold_span(event: &'static str) -> Span {
    debug_span!("fold", event = %event)
}

/// Span covering one cleanup tick.
pub fn cleanup_tick_span(tick: u64) -> Span {
    debug_span!("cleanup_tick", tick = tick)
}

/// Span covering the header lookup for the initial finalized block.
pub fn header_lookup_span(hash: &BlockHash) -> Span {
    info_span!("header_lookup", hash = %hash)
}
