//! Nullable follow subscription — a channel-backed event stream.

use futures_util::stream;
use futures_util::StreamExt;
use headpin_tracker::{FollowEvent, FollowStream, TrackerError};
use tokio::sync::mpsc;

/// Feeds events into a [`FollowStream`]. Dropping it ends the stream.
#[derive(Clone)]
pub struct FollowSender {
    tx: mpsc::UnboundedSender<Result<FollowEvent, TrackerError>>,
}

impl FollowSender {
    /// Deliver an event. Returns false once the stream has been dropped.
    pub fn send(&self, event: FollowEvent) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    /// Make the subscription fail with `reason`.
    pub fn fail(&self, reason: &str) -> bool {
        self.tx
            .send(Err(TrackerError::Subscription(reason.to_string())))
            .is_ok()
    }
}

/// Create a follow stream driven by the returned sender.
pub fn null_follow_source() -> (FollowSender, FollowStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let events = stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    });
    (FollowSender { tx }, events.boxed())
}
