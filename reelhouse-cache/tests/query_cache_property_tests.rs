//! Property and scenario tests for the query cache.
//!
//! Covers request deduplication, invalidation fan-out, idempotent reads,
//! requester cancellation and garbage collection.

use futures_util::future::join_all;
use proptest::prelude::*;
use reelhouse_cache::{
    fetcher_fn, EntryStatus, InvalidationGraph, MutationKind, MutationScope, PolicyTable,
    QueryCache, QueryFetcher, QueryKey, Resource, Target,
};
use reelhouse_core::ReelError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// HELPERS
// ============================================================================

/// Fetcher that counts calls and returns the call number.
fn counting(calls: Arc<AtomicUsize>) -> impl QueryFetcher<Output = usize> {
    fetcher_fn(move || {
        let calls = Arc::clone(&calls);
        async move { Ok::<usize, ReelError>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
    })
}

/// Fetcher that counts calls, then blocks until `gate` opens.
fn gated(calls: Arc<AtomicUsize>, gate: watch::Receiver<bool>) -> impl QueryFetcher<Output = usize> {
    fetcher_fn(move || {
        let calls = Arc::clone(&calls);
        let mut gate = gate.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = gate.wait_for(|open| *open).await;
            Ok::<usize, ReelError>(n)
        }
    })
}

async fn wait_until_not_fetching(cache: &QueryCache, key: &QueryKey) {
    for _ in 0..200 {
        if cache.status(key).unwrap() != Some(EntryStatus::Fetching) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("fetch for {key} never completed");
}

// ============================================================================
// DEDUPLICATION
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Concurrent reads of one key issued before the first resolves share a
    /// single fetch.
    #[test]
    fn prop_concurrent_reads_share_one_fetch(readers in 2usize..16) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache = QueryCache::default();
            let calls = Arc::new(AtomicUsize::new(0));
            let (gate_tx, gate_rx) = watch::channel(false);
            let key = QueryKey::new(Resource::ChannelVideos, ["c1"]);

            let reads = join_all((0..readers).map(|_| {
                cache.read(key.clone(), gated(calls.clone(), gate_rx.clone()))
            }));
            let open = async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                gate_tx.send(true).unwrap();
            };
            let (results, ()) = tokio::join!(reads, open);

            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
            for result in results {
                let read = result.unwrap();
                prop_assert!(read.was_cache_miss());
                prop_assert_eq!(read.into_value(), 1);
            }
            let stats = cache.stats().unwrap();
            prop_assert_eq!(stats.fetches, 1);
            prop_assert_eq!(stats.deduplicated, readers as u64 - 1);
            Ok(())
        })?;
    }

    /// Repeated reads of a cached-until-invalidated key fetch once.
    #[test]
    fn prop_repeated_reads_are_idempotent(reads in 1usize..20, channel in "[a-z0-9]{1,12}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache = QueryCache::default();
            let calls = Arc::new(AtomicUsize::new(0));
            let key = QueryKey::new(Resource::ChannelCourses, [channel]);

            for _ in 0..reads {
                let read = cache.read(key.clone(), counting(calls.clone())).await.unwrap();
                prop_assert_eq!(read.into_value(), 1);
            }
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
            Ok(())
        })?;
    }
}

// ============================================================================
// INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_upload_refetches_affected_subscribers_once() {
    let cache = QueryCache::default();
    let graph = InvalidationGraph::standard();

    let channel_c = QueryKey::new(Resource::ChannelVideos, ["C"]);
    let channel_d = QueryKey::new(Resource::ChannelVideos, ["D"]);
    let all = QueryKey::of(Resource::AllVideos);
    let search = QueryKey::new(Resource::VideoSearch, ["cats"]);

    let calls_c = Arc::new(AtomicUsize::new(0));
    let calls_d = Arc::new(AtomicUsize::new(0));
    let calls_all = Arc::new(AtomicUsize::new(0));
    let calls_search = Arc::new(AtomicUsize::new(0));

    let sub_c = cache.subscribe(channel_c.clone(), counting(calls_c.clone())).unwrap();
    let sub_d = cache.subscribe(channel_d.clone(), counting(calls_d.clone())).unwrap();
    let sub_all = cache.subscribe(all.clone(), counting(calls_all.clone())).unwrap();
    sub_c.settled().await.unwrap();
    sub_d.settled().await.unwrap();
    sub_all.settled().await.unwrap();
    cache.read(search.clone(), counting(calls_search.clone())).await.unwrap();

    let targets = graph.resolve(MutationKind::UploadVideo, &MutationScope::new().channel("C"));
    let report = cache.invalidate(&targets).await.unwrap();

    assert_eq!(report.marked_stale, 3);
    assert_eq!(report.refetched, 2);
    assert_eq!(report.refetch_failures, 0);

    assert_eq!(calls_c.load(Ordering::SeqCst), 2);
    assert_eq!(calls_all.load(Ordering::SeqCst), 2);
    assert_eq!(calls_d.load(Ordering::SeqCst), 1);
    // Unsubscribed entries are only marked; the next read refetches.
    assert_eq!(calls_search.load(Ordering::SeqCst), 1);
    assert_eq!(sub_c.peek().unwrap().map(|r| r.into_value()), Some(2));
    assert_eq!(sub_d.peek().unwrap().map(|r| r.into_value()), Some(1));
}

#[tokio::test]
async fn test_invalidated_cached_entry_refetches_on_next_read() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::new(Resource::MembershipTiers, ["c1"]);

    cache.read(key.clone(), counting(calls.clone())).await.unwrap();
    assert_eq!(cache.status(&key).unwrap(), Some(EntryStatus::Fresh));

    let targets = InvalidationGraph::standard()
        .resolve(MutationKind::CreateMembershipTier, &MutationScope::new().channel("c1"));
    let report = cache.invalidate(&targets).await.unwrap();
    assert_eq!(report.marked_stale, 1);
    assert_eq!(report.refetched, 0);
    assert_eq!(cache.status(&key).unwrap(), Some(EntryStatus::Stale));

    let read = cache.read(key.clone(), counting(calls.clone())).await.unwrap();
    assert!(read.was_cache_miss());
    assert_eq!(read.into_value(), 2);
}

#[tokio::test]
async fn test_subscribe_refetches_entry_invalidated_without_subscribers() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = QueryKey::new(Resource::ChannelCourses, ["c1"]);

    cache.read(key.clone(), counting(calls.clone())).await.unwrap();
    let report = cache.invalidate(&[Target::all(Resource::ChannelCourses)]).await.unwrap();
    assert_eq!(report.marked_stale, 1);
    assert_eq!(report.refetched, 0);

    // Cached-until-invalidated policy: only the invalidation forces the fetch.
    let sub = cache.subscribe(key.clone(), counting(calls.clone())).unwrap();
    let read = sub.settled().await.unwrap();

    assert_eq!(read.into_value(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sub.status().unwrap(), EntryStatus::Fresh);
}

#[tokio::test]
async fn test_invalidation_during_fetch_refetches_after_it() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let (gate_tx, gate_rx) = watch::channel(false);
    let key = QueryKey::new(Resource::Course, ["k1"]);

    let sub = cache.subscribe(key.clone(), gated(calls.clone(), gate_rx)).unwrap();
    assert_eq!(sub.status().unwrap(), EntryStatus::Fetching);

    let targets = InvalidationGraph::standard().resolve(
        MutationKind::UpdateCourse,
        &MutationScope::new().course("k1").channel("c1"),
    );
    let invalidate = cache.invalidate(&targets);
    let open = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate_tx.send(true).unwrap();
    };
    let (report, ()) = tokio::join!(invalidate, open);
    let report = report.unwrap();

    assert_eq!(report.refetched, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sub.peek().unwrap().map(|r| r.into_value()), Some(2));
    assert_eq!(sub.status().unwrap(), EntryStatus::Fresh);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_dropped_requester_does_not_cancel_fetch() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let (gate_tx, gate_rx) = watch::channel(false);
    let key = QueryKey::new(Resource::Playlist, ["p1"]);

    let read = cache.read(key.clone(), gated(calls.clone(), gate_rx.clone()));
    let abandoned = tokio::time::timeout(Duration::from_millis(10), read).await;
    assert!(abandoned.is_err());
    assert_eq!(cache.status(&key).unwrap(), Some(EntryStatus::Fetching));

    gate_tx.send(true).unwrap();
    wait_until_not_fetching(&cache, &key).await;

    let read = cache.read(key.clone(), gated(calls.clone(), gate_rx)).await.unwrap();
    assert!(read.was_cache_hit());
    assert_eq!(read.into_value(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_discards_in_flight_result() {
    let cache = QueryCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let (gate_tx, gate_rx) = watch::channel(false);
    let key = QueryKey::of(Resource::UserDonationHistory);

    let read = cache.read(key.clone(), gated(calls.clone(), gate_rx));
    let _ = tokio::time::timeout(Duration::from_millis(10), read).await;
    cache.clear().unwrap();

    gate_tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!cache.contains(&key).unwrap());
}

// ============================================================================
// GARBAGE COLLECTION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_gc_spares_subscribed_entries() {
    let policies = PolicyTable::standard().with_retention(Duration::from_secs(30));
    let cache = QueryCache::new(policies);
    let watched = QueryKey::of(Resource::FollowedChannels);
    let idle = QueryKey::of(Resource::IsStripeConfigured);

    let sub = cache.subscribe(watched.clone(), counting(Arc::new(AtomicUsize::new(0)))).unwrap();
    sub.settled().await.unwrap();
    cache.read(idle.clone(), counting(Arc::new(AtomicUsize::new(0)))).await.unwrap();

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(cache.collect_garbage().unwrap(), 1);
    assert!(cache.contains(&watched).unwrap());
    assert!(!cache.contains(&idle).unwrap());

    drop(sub);
    assert_eq!(cache.collect_garbage().unwrap(), 0);
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(cache.collect_garbage().unwrap(), 1);
    assert!(cache.is_empty().unwrap());
    assert_eq!(cache.stats().unwrap().evictions, 2);
}
