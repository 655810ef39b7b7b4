//! End-to-end tests of the tracker pipeline: follow stream → driver →
//! snapshots → cleanup scheduler → feedback → unpin sink.
//!
//! All tests run on a paused clock, so cleanup ticks happen exactly when
//! the test sleeps past them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use headpin_nullables::{
    null_follow_source, FollowSender, NullHeaderFetcher, NullRuntimeConstructor,
    RecordingUnpinSink,
};
use headpin_runtime::RuntimeError;
use headpin_tracker::{
    spawn_tracker, Collaborators, FollowEvent, PinnedBlocks, ShutdownController, TrackerConfig,
    TrackerError, TrackerHandle,
};
use headpin_types::{BlockHash, BlockHeader, RuntimeId};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TICK: Duration = Duration::from_millis(100);

fn hash(n: u8) -> BlockHash {
    BlockHash::new([n; 32])
}

struct Harness {
    source: FollowSender,
    handle: TrackerHandle,
    sink: Arc<RecordingUnpinSink>,
    shutdown: ShutdownController,
}

fn config() -> TrackerConfig {
    TrackerConfig {
        cleanup_interval_ms: TICK.as_millis() as u64,
        header_timeout_ms: 1_000,
        ..TrackerConfig::default()
    }
}

fn start_with(headers: NullHeaderFetcher, runtimes: NullRuntimeConstructor) -> Harness {
    let (source, stream) = null_follow_source();
    let sink = Arc::new(RecordingUnpinSink::new());
    let shutdown = ShutdownController::new();
    let collaborators = Collaborators {
        headers: Arc::new(headers),
        runtimes: Arc::new(runtimes),
        unpin_sink: sink.clone(),
    };
    let handle = spawn_tracker(&config(), stream, collaborators, shutdown.subscribe())
        .expect("valid config");
    Harness {
        source,
        handle,
        sink,
        shutdown,
    }
}

fn start() -> Harness {
    start_with(NullHeaderFetcher::new(), NullRuntimeConstructor::new())
}

fn initialized(n: u8) -> FollowEvent {
    FollowEvent::Initialized {
        hash: hash(n),
        header: Some(BlockHeader::new(100, hash(0))),
    }
}

fn new_block(parent: u8, child: u8) -> FollowEvent {
    FollowEvent::NewBlock {
        parent: hash(parent),
        hash: hash(child),
        new_runtime: false,
    }
}

fn best(n: u8) -> FollowEvent {
    FollowEvent::BestBlockChanged { hash: hash(n) }
}

fn finalized(ns: &[u8], pruned: &[u8]) -> FollowEvent {
    FollowEvent::Finalized {
        finalized: ns.iter().map(|n| hash(*n)).collect(),
        pruned: pruned.iter().map(|n| hash(*n)).collect(),
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<Arc<PinnedBlocks>>,
    mut pred: impl FnMut(&PinnedBlocks) -> bool,
) -> Arc<PinnedBlocks> {
    rx.wait_for(|s| pred(s)).await.expect("pipeline alive").clone()
}

fn keys(snapshot: &PinnedBlocks) -> BTreeSet<BlockHash> {
    snapshot.blocks.keys().copied().collect()
}

/// A(1) <- B(2) <- C(3), best C, finalized B.
async fn linear_chain(h: &Harness) -> watch::Receiver<Arc<PinnedBlocks>> {
    let mut rx = h.handle.subscribe();
    for event in [
        initialized(1),
        new_block(1, 2),
        new_block(2, 3),
        best(3),
        finalized(&[2], &[]),
    ] {
        assert!(h.source.send(event));
    }
    wait_for(&mut rx, |s| s.finalized == hash(2)).await;
    rx
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn end_to_end_snapshot_after_finalization() {
    let h = start();
    let mut rx = h.handle.subscribe();
    for event in [initialized(0xA), new_block(0xA, 0xB), best(0xB), finalized(&[0xB], &[])] {
        h.source.send(event);
    }
    let s = wait_for(&mut rx, |s| s.finalized == hash(0xB)).await;

    assert_eq!(s.best, hash(0xB));
    assert_eq!(keys(&s), BTreeSet::from([hash(0xA), hash(0xB)]));
    assert_eq!(s.get(&hash(0xA)).unwrap().ref_count, 0);
    assert_eq!(s.get(&hash(0xA)).unwrap().number, 100);
    assert_eq!(s.get(&hash(0xB)).unwrap().number, 101);
    assert_eq!(
        s.get(&hash(0xB)).unwrap().runtime,
        s.get(&hash(0xA)).unwrap().runtime
    );
}

#[tokio::test(start_paused = true)]
async fn ancestors_are_unpinned_after_two_ticks() {
    let h = start();
    let _rx = linear_chain(&h).await;

    // One tick: observed once, not yet unpinned.
    tokio::time::sleep(TICK + TICK / 2).await;
    assert!(h.sink.batches().is_empty());
    assert!(h.handle.snapshot().contains(&hash(1)));

    tokio::time::sleep(TICK).await;
    assert_eq!(h.sink.batches(), vec![vec![hash(1)]]);
    let s = h.handle.snapshot();
    assert_eq!(keys(&s), BTreeSet::from([hash(2), hash(3)]));
    assert!(s.get(&hash(2)).unwrap().children.contains(&hash(3)));
    assert_eq!(h.handle.metrics().blocks_unpinned.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn finalized_and_best_are_never_unpinned() {
    let h = start();
    let _rx = linear_chain(&h).await;
    tokio::time::sleep(TICK * 10).await;

    let s = h.handle.snapshot();
    assert!(s.contains(&hash(2)));
    assert!(s.contains(&hash(3)));
    assert_eq!(h.sink.unpinned(), vec![hash(1)]);
}

#[tokio::test(start_paused = true)]
async fn held_ancestor_stays_pinned_until_released() {
    let h = start();
    let _rx = linear_chain(&h).await;
    let usage = h.handle.usage();
    usage.hold(hash(1)).await.unwrap();

    tokio::time::sleep(TICK * 5).await;
    assert!(h.sink.batches().is_empty());
    assert_eq!(h.handle.snapshot().get(&hash(1)).unwrap().ref_count, 1);

    usage.release(hash(1)).await.unwrap();
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(h.sink.unpinned(), vec![hash(1)]);
}

#[tokio::test(start_paused = true)]
async fn released_oldest_ancestor_is_unpinned_with_its_descendants() {
    let h = start();
    let mut rx = h.handle.subscribe();
    h.source.send(initialized(0xA));
    wait_for(&mut rx, |s| s.contains(&hash(0xA))).await;
    let usage = h.handle.usage();
    usage.hold(hash(0xA)).await.unwrap();

    for event in [
        new_block(0xA, 0xB),
        new_block(0xB, 0xC),
        best(0xC),
        finalized(&[0xB, 0xC], &[]),
    ] {
        h.source.send(event);
    }
    wait_for(&mut rx, |s| s.finalized == hash(0xC)).await;

    // B sits below the held A, so it stays too.
    tokio::time::sleep(TICK * 5).await;
    assert!(h.sink.batches().is_empty());
    assert_eq!(
        keys(&h.handle.snapshot()),
        BTreeSet::from([hash(0xA), hash(0xB), hash(0xC)])
    );

    usage.release(hash(0xA)).await.unwrap();
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(h.sink.batches(), vec![vec![hash(0xA), hash(0xB)]]);
    assert_eq!(keys(&h.handle.snapshot()), BTreeSet::from([hash(0xC)]));
}

#[tokio::test(start_paused = true)]
async fn dropping_a_hold_releases_the_block() {
    let h = start();
    let mut rx = linear_chain(&h).await;

    let guard = h.handle.usage().acquire(hash(1)).await.unwrap();
    tokio::time::sleep(TICK * 4).await;
    assert!(h.sink.batches().is_empty());

    drop(guard);
    wait_for(&mut rx, |s| s.get(&hash(1)).is_some_and(|b| b.ref_count == 0)).await;
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(h.sink.unpinned(), vec![hash(1)]);
}

#[tokio::test(start_paused = true)]
async fn release_without_hold_is_rejected_and_pipeline_continues() {
    let h = start();
    let mut rx = linear_chain(&h).await;
    let usage = h.handle.usage();

    assert_eq!(
        usage.release(hash(3)).await,
        Err(TrackerError::ReleaseWithoutHold(hash(3)))
    );
    assert_eq!(
        usage.hold(hash(77)).await,
        Err(TrackerError::NotPinned(hash(77)))
    );
    assert_eq!(h.handle.metrics().usage_rejected.get(), 2);

    h.source.send(new_block(3, 4));
    let s = wait_for(&mut rx, |s| s.contains(&hash(4))).await;
    assert_eq!(s.get(&hash(3)).unwrap().ref_count, 0);
}

#[tokio::test(start_paused = true)]
async fn pruned_forks_are_unpinned() {
    let h = start();
    let mut rx = h.handle.subscribe();
    for event in [
        initialized(1),
        new_block(1, 2),
        new_block(1, 5),
        new_block(5, 6),
        best(2),
        finalized(&[2], &[5, 6]),
    ] {
        h.source.send(event);
    }
    let s = wait_for(&mut rx, |s| s.finalized == hash(2)).await;
    assert_eq!(s.pruned, BTreeSet::from([hash(5), hash(6)]));

    tokio::time::sleep(TICK * 3).await;
    let s = h.handle.snapshot();
    assert_eq!(keys(&s), BTreeSet::from([hash(2)]));
    assert!(s.pruned.is_empty());
    let unpinned: BTreeSet<_> = h.sink.unpinned().into_iter().collect();
    assert_eq!(unpinned, BTreeSet::from([hash(1), hash(5), hash(6)]));
}

#[tokio::test(start_paused = true)]
async fn runtime_is_destroyed_with_its_last_block() {
    let h = start();
    let mut rx = h.handle.subscribe();
    for event in [
        initialized(1),
        FollowEvent::NewBlock {
            parent: hash(1),
            hash: hash(2),
            new_runtime: true,
        },
        new_block(1, 3),
        best(3),
        finalized(&[3], &[2]),
    ] {
        h.source.send(event);
    }
    let s = wait_for(&mut rx, |s| s.finalized == hash(3)).await;
    let upgraded = RuntimeId::new(hash(2));
    let descriptor = s.runtimes.get(&upgraded).cloned().expect("runtime tracked");
    assert_eq!(s.runtimes.len(), 2);

    let s = wait_for(&mut rx, |s| !s.contains(&hash(2))).await;
    assert!(!s.runtimes.contains_key(&upgraded));
    assert_eq!(s.runtimes.len(), 1);
    assert_eq!(
        s.finalized_runtime.as_ref().map(|d| d.id()),
        Some(RuntimeId::new(hash(1)))
    );
    // The build either finished before removal or was discarded with it.
    match descriptor.ready().await {
        Ok(metadata) => assert_eq!(metadata.spec_version, 2),
        Err(e) => assert_eq!(e, RuntimeError::Discarded(upgraded)),
    }
}

#[tokio::test(start_paused = true)]
async fn finalized_runtime_resolves_in_background() {
    let (runtimes, gate) = NullRuntimeConstructor::gated();
    let h = start_with(NullHeaderFetcher::new(), runtimes);
    let mut rx = h.handle.subscribe();
    h.source.send(initialized(7));
    h.source.send(new_block(7, 8));

    // Folding did not wait for the runtime build.
    let s = wait_for(&mut rx, |s| s.contains(&hash(8))).await;
    let runtime = s.finalized_runtime.clone().expect("initialized");
    assert!(!runtime.is_ready());

    gate.open();
    let metadata = runtime.ready().await.expect("gate opened");
    assert_eq!(*metadata, NullRuntimeConstructor::metadata_for(&hash(7)));
}

#[tokio::test(start_paused = true)]
async fn failed_runtime_does_not_stop_the_pipeline() {
    let runtimes = NullRuntimeConstructor::new().failing_for([hash(2)]);
    let h = start_with(NullHeaderFetcher::new(), runtimes);
    let mut rx = h.handle.subscribe();
    h.source.send(initialized(1));
    h.source.send(FollowEvent::NewBlock {
        parent: hash(1),
        hash: hash(2),
        new_runtime: true,
    });
    let s = wait_for(&mut rx, |s| s.contains(&hash(2))).await;

    let err = s.runtime_of(&hash(2)).unwrap().ready().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Construction { .. }));

    h.source.send(new_block(2, 3));
    let s = wait_for(&mut rx, |s| s.contains(&hash(3))).await;
    assert_eq!(s.get(&hash(3)).unwrap().runtime, RuntimeId::new(hash(2)));
}

#[tokio::test(start_paused = true)]
async fn missing_initial_header_is_fetched() {
    let headers = NullHeaderFetcher::new().with_header(hash(4), BlockHeader::new(42, hash(3)));
    let h = start_with(headers, NullRuntimeConstructor::new());
    let mut rx = h.handle.subscribe();
    h.source.send(FollowEvent::Initialized {
        hash: hash(4),
        header: None,
    });
    h.source.send(new_block(4, 5));

    let s = wait_for(&mut rx, |s| s.contains(&hash(5))).await;
    let root = s.get(&hash(4)).unwrap();
    assert_eq!(root.number, 42);
    assert_eq!(root.parent, hash(3));
    assert_eq!(s.get(&hash(5)).unwrap().number, 43);
}

#[tokio::test(start_paused = true)]
async fn header_lookup_timeout_is_fatal() {
    let h = start_with(NullHeaderFetcher::hanging(), NullRuntimeConstructor::new());
    h.source.send(FollowEvent::Initialized {
        hash: hash(4),
        header: None,
    });
    let err = h.handle.join().await.unwrap_err();
    assert!(matches!(err, TrackerError::HeaderLookup { hash: h, .. } if h == hash(4)));
}

#[tokio::test(start_paused = true)]
async fn unknown_header_is_fatal() {
    let h = start();
    h.source.send(FollowEvent::Initialized {
        hash: hash(4),
        header: None,
    });
    let err = h.handle.join().await.unwrap_err();
    assert!(matches!(err, TrackerError::HeaderLookup { .. }));
}

#[tokio::test(start_paused = true)]
async fn usage_keeps_flowing_during_header_lookup() {
    let h = start_with(NullHeaderFetcher::hanging(), NullRuntimeConstructor::new());
    h.source.send(FollowEvent::Initialized {
        hash: hash(4),
        header: None,
    });
    // The driver answers while the lookup is still pending.
    assert_eq!(
        h.handle.usage().hold(hash(4)).await,
        Err(TrackerError::NotPinned(hash(4)))
    );
}

#[tokio::test(start_paused = true)]
async fn out_of_order_block_is_fatal_and_stops_everything() {
    let h = start();
    let mut rx = h.handle.subscribe();
    h.source.send(initialized(1));
    h.source.send(new_block(8, 9));

    let usage = h.handle.usage();
    let err = h.handle.join().await.unwrap_err();
    assert_eq!(
        err,
        TrackerError::UnknownParent {
            parent: hash(8),
            hash: hash(9)
        }
    );

    // Publisher is gone, so subscribers (and the scheduler) see the end.
    while rx.changed().await.is_ok() {}
    assert_eq!(usage.hold(hash(1)).await, Err(TrackerError::Stopped));
}

#[tokio::test(start_paused = true)]
async fn double_initialized_is_fatal() {
    let h = start();
    h.source.send(initialized(1));
    h.source.send(initialized(2));
    assert_eq!(
        h.handle.join().await,
        Err(TrackerError::AlreadyInitialized(hash(1)))
    );
}

#[tokio::test(start_paused = true)]
async fn subscription_error_is_surfaced() {
    let h = start();
    h.source.send(initialized(1));
    h.source.fail("connection reset");
    assert_eq!(
        h.handle.join().await,
        Err(TrackerError::Subscription("connection reset".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn stream_end_completes_the_pipeline() {
    let h = start();
    let mut rx = linear_chain(&h).await;
    let Harness { source, handle, sink, .. } = h;

    drop(source);
    assert_eq!(handle.join().await, Ok(()));
    while rx.changed().await.is_ok() {}

    // No scheduler left to unpin anything.
    tokio::time::sleep(TICK * 5).await;
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected_at_spawn() {
    let (_source, stream) = null_follow_source();
    let collaborators = Collaborators {
        headers: Arc::new(NullHeaderFetcher::new()),
        runtimes: Arc::new(NullRuntimeConstructor::new()),
        unpin_sink: Arc::new(RecordingUnpinSink::new()),
    };
    let config = TrackerConfig {
        cleanup_interval_ms: 0,
        ..config()
    };
    let shutdown = ShutdownController::new();
    let result = spawn_tracker(&config, stream, collaborators, shutdown.subscribe());
    assert!(matches!(result, Err(TrackerError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_pipeline() {
    let h = start();
    let _rx = linear_chain(&h).await;
    h.shutdown.shutdown();
    assert_eq!(h.handle.join().await, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_sees_latest_snapshot() {
    let h = start();
    let _rx = linear_chain(&h).await;
    let late = h.handle.subscribe();
    let s = late.borrow().clone();
    assert_eq!(s.best, hash(3));
    assert_eq!(s.finalized, hash(2));
}

#[tokio::test(start_paused = true)]
async fn metrics_follow_the_snapshot() {
    let h = start();
    let _rx = linear_chain(&h).await;
    let metrics = h.handle.metrics();
    assert_eq!(metrics.events_applied.get(), 5);
    assert_eq!(metrics.pinned_blocks.get(), 3);
    assert_eq!(metrics.runtimes.get(), 1);

    tokio::time::sleep(TICK * 3).await;
    assert_eq!(metrics.pinned_blocks.get(), 2);
    assert!(metrics.encode().contains("headpin_blocks_unpinned_total 1"));
}
