//! Deduplicating keyed query cache.
//!
//! Each [`QueryKey`] maps to one entry holding the last value, its
//! freshness, the subscriber count and at most one in-flight fetch.
//! Concurrent requesters of a key join the in-flight fetch instead of
//! starting their own.
//!
//! Fetches run on a spawned task. A requester that stops waiting never
//! cancels the remote call; the result still lands in the cache (or is
//! discarded if the entry was cleared meanwhile).

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use reelhouse_core::{CacheError, ReelError, ReelResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::freshness::{CacheRead, EntryStatus};
use crate::key::{QueryKey, Target};
use crate::policy::{PolicyTable, ResourcePolicy};
use crate::stats::{CacheCounters, CacheStats};

type AnyValue = Arc<dyn Any + Send + Sync>;

/// A fetched value with its wall-clock fetch time.
#[derive(Clone)]
struct Fetched {
    value: AnyValue,
    fetched_at: DateTime<Utc>,
}

type SharedFetch = Shared<BoxFuture<'static, ReelResult<Fetched>>>;

/// Produces the value for one cache key.
#[async_trait]
pub trait QueryFetcher: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    async fn fetch(&self) -> ReelResult<Self::Output>;
}

/// [`QueryFetcher`] backed by a closure returning a future.
pub struct FnFetcher<F> {
    f: F,
}

/// Wrap a closure as a [`QueryFetcher`].
pub fn fetcher_fn<F, Fut, T>(f: F) -> FnFetcher<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ReelResult<T>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    FnFetcher { f }
}

#[async_trait]
impl<F, Fut, T> QueryFetcher for FnFetcher<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ReelResult<T>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    async fn fetch(&self) -> ReelResult<T> {
        (self.f)().await
    }
}

trait ErasedFetcher: Send + Sync {
    fn fetch_erased(self: Arc<Self>) -> BoxFuture<'static, ReelResult<AnyValue>>;
}

struct Erased<F>(F);

impl<F: QueryFetcher> ErasedFetcher for Erased<F> {
    fn fetch_erased(self: Arc<Self>) -> BoxFuture<'static, ReelResult<AnyValue>> {
        async move {
            let value = self.0.fetch().await?;
            Ok(Arc::new(value) as AnyValue)
        }
        .boxed()
    }
}

struct InFlight {
    id: u64,
    /// Entry generation when the fetch started.
    generation: u64,
    shared: SharedFetch,
}

struct Entry {
    value: Option<Fetched>,
    fetched_instant: Option<Instant>,
    invalidated: bool,
    error: Option<ReelError>,
    in_flight: Option<InFlight>,
    subscribers: usize,
    fetcher: Option<Arc<dyn ErasedFetcher>>,
    idle_since: Option<Instant>,
    /// Bumped on every invalidation; results of older fetches land stale.
    generation: u64,
}

impl Entry {
    fn new(now: Instant) -> Self {
        Self {
            value: None,
            fetched_instant: None,
            invalidated: false,
            error: None,
            in_flight: None,
            subscribers: 0,
            fetcher: None,
            idle_since: Some(now),
            generation: 0,
        }
    }

    fn is_fresh(&self, policy: &ResourcePolicy, now: Instant) -> bool {
        match (&self.value, self.fetched_instant) {
            (Some(_), Some(at)) => !self.invalidated && policy.is_fresh(now.duration_since(at)),
            _ => false,
        }
    }

    fn status(&self, policy: &ResourcePolicy, now: Instant) -> EntryStatus {
        if self.in_flight.is_some() {
            EntryStatus::Fetching
        } else if self.error.is_some() {
            EntryStatus::Error
        } else if self.value.is_none() {
            EntryStatus::Idle
        } else if self.is_fresh(policy, now) {
            EntryStatus::Fresh
        } else {
            EntryStatus::Stale
        }
    }

    fn reset(&mut self) {
        self.value = None;
        self.fetched_instant = None;
        self.invalidated = false;
        self.error = None;
        self.in_flight = None;
        self.generation += 1;
    }
}

enum Step {
    Hit(Fetched),
    /// Await this fetch; its result answers the request.
    Join(SharedFetch),
    /// An older fetch predates an invalidation; await it, then plan again.
    Wait(SharedFetch),
}

/// Outcome of [`QueryCache::invalidate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Entries marked stale.
    pub marked_stale: usize,
    /// Subscribed entries refetched successfully.
    pub refetched: usize,
    /// Subscribed entries whose refetch failed.
    pub refetch_failures: usize,
}

struct Inner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    policies: PolicyTable,
    counters: CacheCounters,
    next_fetch_id: AtomicU64,
}

/// Keyed cache of asynchronous fetch results.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len().unwrap_or_default())
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(PolicyTable::standard())
    }
}

impl QueryCache {
    pub fn new(policies: PolicyTable) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                policies,
                counters: CacheCounters::default(),
                next_fetch_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.inner.policies
    }

    fn lock(&self) -> ReelResult<MutexGuard<'_, HashMap<QueryKey, Entry>>> {
        self.inner
            .entries
            .lock()
            .map_err(|_| ReelError::from(CacheError::LockPoisoned))
    }

    /// Read `key`, fetching only if there is no fresh value.
    ///
    /// Concurrent reads of the same key share one fetch. Failed fetches are
    /// retried per the resource's policy before the error is returned.
    pub async fn read<F>(&self, key: QueryKey, fetcher: F) -> ReelResult<CacheRead<F::Output>>
    where
        F: QueryFetcher,
    {
        let fetcher: Arc<dyn ErasedFetcher> = Arc::new(Erased(fetcher));
        let mut first = true;
        loop {
            let step = self.plan(&key, Some(&fetcher), true)?;
            match step {
                Some(Step::Hit(fetched)) => {
                    if first {
                        self.inner.counters.record_hit();
                    }
                    debug!(key = %key, "Cache hit");
                    let value = downcast::<F::Output>(&key, &fetched)?;
                    return Ok(CacheRead::from_cache(value, fetched.fetched_at, false));
                }
                Some(Step::Join(shared)) => {
                    if first {
                        self.inner.counters.record_miss();
                    }
                    let fetched = shared.await?;
                    let value = downcast::<F::Output>(&key, &fetched)?;
                    return Ok(CacheRead::from_fetch(value, fetched.fetched_at));
                }
                Some(Step::Wait(shared)) => {
                    if first {
                        self.inner.counters.record_miss();
                    }
                    let _ = shared.await;
                }
                None => {
                    return Err(CacheError::FetchAborted {
                        key: key.to_string(),
                        reason: "no fetcher registered".to_string(),
                    }
                    .into())
                }
            }
            first = false;
        }
    }

    /// Decide how to answer a request for `key`, starting a fetch if needed.
    ///
    /// Returns `None` when the entry is absent and `create` is false, or
    /// when no fetcher is known for it.
    fn plan(
        &self,
        key: &QueryKey,
        fetcher: Option<&Arc<dyn ErasedFetcher>>,
        create: bool,
    ) -> ReelResult<Option<Step>> {
        let now = Instant::now();
        let policy = self.inner.policies.get(key.resource());
        let mut entries = self.lock()?;

        if !entries.contains_key(key) {
            if !create {
                return Ok(None);
            }
            entries.insert(key.clone(), Entry::new(now));
        }
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };

        if let Some(fetcher) = fetcher {
            entry.fetcher = Some(Arc::clone(fetcher));
        }

        // Only plain reads may be answered from cache; revalidation always fetches.
        if create && entry.is_fresh(policy, now) {
            if entry.subscribers == 0 {
                entry.idle_since = Some(now);
            }
            if let Some(fetched) = &entry.value {
                return Ok(Some(Step::Hit(fetched.clone())));
            }
        }

        if let Some(in_flight) = &entry.in_flight {
            if in_flight.generation == entry.generation {
                self.inner.counters.record_dedup();
                debug!(key = %key, fetch_id = in_flight.id, "Joining in-flight fetch");
                return Ok(Some(Step::Join(in_flight.shared.clone())));
            }
            return Ok(Some(Step::Wait(in_flight.shared.clone())));
        }

        let Some(fetcher) = entry.fetcher.clone() else {
            return Ok(None);
        };
        let shared = self.start_fetch(key, entry, fetcher)?;
        Ok(Some(Step::Join(shared)))
    }

    /// Spawn the fetch for `key` and record it as the entry's in-flight fetch.
    ///
    /// Must be called with the entry lock held.
    fn start_fetch(
        &self,
        key: &QueryKey,
        entry: &mut Entry,
        fetcher: Arc<dyn ErasedFetcher>,
    ) -> ReelResult<SharedFetch> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| CacheError::FetchAborted {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let generation = entry.generation;
        let policy = self.inner.policies.get(key.resource()).clone();
        let cache = self.clone();
        let task_key = key.clone();

        self.inner.counters.record_fetch();
        debug!(key = %key, fetch_id = id, generation, "Starting fetch");

        let task = runtime.spawn(async move {
            let result = run_with_retry(&cache.inner.counters, &task_key, fetcher, &policy)
                .await
                .map(|value| Fetched {
                    value,
                    fetched_at: Utc::now(),
                });
            cache.complete(&task_key, id, generation, &result);
            result
        });

        let abort_key = key.to_string();
        let shared = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(CacheError::FetchAborted {
                    key: abort_key,
                    reason: e.to_string(),
                }
                .into()),
            }
        }
        .boxed()
        .shared();

        entry.in_flight = Some(InFlight {
            id,
            generation,
            shared: shared.clone(),
        });
        Ok(shared)
    }

    /// Store the result of fetch `id` if it is still the entry's fetch.
    fn complete(&self, key: &QueryKey, id: u64, generation: u64, result: &ReelResult<Fetched>) {
        let Ok(mut entries) = self.inner.entries.lock() else {
            warn!(key = %key, "Cache lock poisoned, dropping fetch result");
            return;
        };
        let Some(entry) = entries.get_mut(key) else {
            debug!(key = %key, fetch_id = id, "Entry gone, discarding fetch result");
            return;
        };
        if entry.in_flight.as_ref().map(|f| f.id) != Some(id) {
            debug!(key = %key, fetch_id = id, "Fetch superseded, discarding result");
            return;
        }

        let now = Instant::now();
        entry.in_flight = None;
        if entry.subscribers == 0 {
            entry.idle_since = Some(now);
        }

        match result {
            Ok(fetched) => {
                entry.value = Some(fetched.clone());
                entry.fetched_instant = Some(now);
                entry.error = None;
                // Invalidated while in flight: the value predates the write.
                entry.invalidated = entry.generation != generation;
            }
            Err(e) => {
                self.inner.counters.record_failure();
                warn!(key = %key, error = %e, "Fetch failed");
                entry.error = Some(e.clone());
            }
        }
    }

    /// Fetch `key` again regardless of freshness, using its registered fetcher.
    ///
    /// Joins a fetch that started after the last invalidation instead of
    /// starting another. Returns `None` if the key is unknown.
    async fn revalidate(&self, key: &QueryKey) -> ReelResult<Option<Fetched>> {
        loop {
            match self.plan(key, None, false)? {
                None => return Ok(None),
                Some(Step::Hit(fetched)) => return Ok(Some(fetched)),
                Some(Step::Join(shared)) => return shared.await.map(Some),
                Some(Step::Wait(shared)) => {
                    let _ = shared.await;
                }
            }
        }
    }

    /// Register an active subscriber for `key`.
    ///
    /// Starts a background fetch when the entry has no value, when it was
    /// invalidated since its last fetch, or when it is stale and the resource
    /// revalidates on mount.
    pub fn subscribe<F>(&self, key: QueryKey, fetcher: F) -> ReelResult<QuerySubscription<F::Output>>
    where
        F: QueryFetcher,
    {
        let fetcher: Arc<dyn ErasedFetcher> = Arc::new(Erased(fetcher));
        let now = Instant::now();
        let policy = self.inner.policies.get(key.resource());
        let mut entries = self.lock()?;

        let entry = entries.entry(key.clone()).or_insert_with(|| Entry::new(now));
        entry.fetcher = Some(Arc::clone(&fetcher));

        let needs_fetch = entry.in_flight.is_none()
            && (entry.value.is_none()
                || entry.invalidated
                || (policy.revalidate_on_mount && !entry.is_fresh(policy, now)));
        if needs_fetch {
            self.start_fetch(&key, entry, fetcher)?;
        }

        entry.subscribers += 1;
        entry.idle_since = None;
        debug!(key = %key, subscribers = entry.subscribers, fetching = needs_fetch, "Subscribed");

        Ok(QuerySubscription {
            cache: self.clone(),
            key,
            _value: PhantomData,
        })
    }

    fn release(&self, key: &QueryKey) {
        let mut entries = match self.inner.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = entries.get_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers == 0 {
                entry.idle_since = Some(Instant::now());
            }
        }
    }

    /// Mark every entry matching `targets` stale and refetch the subscribed ones.
    ///
    /// Resolves once each subscribed entry has been refetched exactly once.
    /// Refetch failures are logged and counted; they do not fail the call.
    pub async fn invalidate(&self, targets: &[Target]) -> ReelResult<InvalidationReport> {
        let mut refetch: Vec<QueryKey> = Vec::new();
        let mut marked = 0usize;
        {
            let mut entries = self.lock()?;
            for (key, entry) in entries.iter_mut() {
                if !targets.iter().any(|target| target.matches(key)) {
                    continue;
                }
                entry.invalidated = true;
                entry.generation += 1;
                marked += 1;
                if entry.subscribers > 0 {
                    refetch.push(key.clone());
                }
            }
        }

        self.inner.counters.record_invalidations(marked as u64);
        debug!(
            targets = targets.len(),
            marked,
            refetching = refetch.len(),
            "Invalidated cache entries"
        );

        let results = join_all(refetch.iter().map(|key| self.revalidate(key))).await;

        let mut report = InvalidationReport {
            marked_stale: marked,
            ..InvalidationReport::default()
        };
        for (key, result) in refetch.iter().zip(results) {
            match result {
                Ok(Some(_)) => report.refetched += 1,
                Ok(None) => {}
                Err(e) => {
                    report.refetch_failures += 1;
                    warn!(key = %key, error = %e, "Refetch after invalidation failed");
                }
            }
        }
        Ok(report)
    }

    /// Evict unsubscribed, idle entries older than their retention window.
    pub fn collect_garbage(&self) -> ReelResult<usize> {
        let now = Instant::now();
        let policies = &self.inner.policies;
        let mut entries = self.lock()?;
        let before = entries.len();

        entries.retain(|key, entry| {
            if entry.subscribers > 0 || entry.in_flight.is_some() {
                return true;
            }
            match entry.idle_since {
                Some(since) => now.duration_since(since) < policies.get(key.resource()).retention,
                None => true,
            }
        });

        let evicted = before - entries.len();
        if evicted > 0 {
            self.inner.counters.record_evictions(evicted as u64);
            debug!(evicted, remaining = entries.len(), "Collected idle cache entries");
        }
        Ok(evicted)
    }

    /// Drop all cached data.
    ///
    /// Unsubscribed entries are removed. Subscribed entries are emptied but
    /// kept so their subscribers stay registered. Results of fetches already
    /// in flight are discarded.
    pub fn clear(&self) -> ReelResult<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.subscribers > 0);
        for entry in entries.values_mut() {
            entry.reset();
        }
        let removed = before - entries.len();
        info!(removed, emptied = entries.len(), "Query cache cleared");
        Ok(removed)
    }

    /// Current value of `key` without fetching.
    pub fn peek<T>(&self, key: &QueryKey) -> ReelResult<Option<CacheRead<T>>>
    where
        T: Clone + 'static,
    {
        let now = Instant::now();
        let policy = self.inner.policies.get(key.resource());
        let entries = self.lock()?;
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        let Some(fetched) = &entry.value else {
            return Ok(None);
        };
        let value = downcast::<T>(key, fetched)?;
        Ok(Some(CacheRead::from_cache(
            value,
            fetched.fetched_at,
            !entry.is_fresh(policy, now),
        )))
    }

    pub fn status(&self, key: &QueryKey) -> ReelResult<Option<EntryStatus>> {
        let now = Instant::now();
        let policy = self.inner.policies.get(key.resource());
        let entries = self.lock()?;
        Ok(entries.get(key).map(|entry| entry.status(policy, now)))
    }

    /// Error of the last fetch of `key`, if it failed.
    pub fn last_error(&self, key: &QueryKey) -> ReelResult<Option<ReelError>> {
        let entries = self.lock()?;
        Ok(entries.get(key).and_then(|entry| entry.error.clone()))
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> ReelResult<usize> {
        let entries = self.lock()?;
        Ok(entries.get(key).map_or(0, |entry| entry.subscribers))
    }

    pub fn contains(&self, key: &QueryKey) -> ReelResult<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    pub fn len(&self) -> ReelResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> ReelResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    pub fn stats(&self) -> ReelResult<CacheStats> {
        let entries = self.len()?;
        Ok(self.inner.counters.snapshot(entries))
    }
}

async fn run_with_retry(
    counters: &CacheCounters,
    key: &QueryKey,
    fetcher: Arc<dyn ErasedFetcher>,
    policy: &ResourcePolicy,
) -> ReelResult<AnyValue> {
    let mut attempt: u32 = 0;
    loop {
        match Arc::clone(&fetcher).fetch_erased().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.retry_count => {
                attempt += 1;
                counters.record_retry();
                warn!(
                    key = %key,
                    attempt,
                    max_retries = policy.retry_count,
                    error = %err,
                    "Read failed, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn downcast<T: Clone + 'static>(key: &QueryKey, fetched: &Fetched) -> ReelResult<T> {
    fetched
        .value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| CacheError::TypeMismatch { key: key.to_string() }.into())
}

/// An active subscriber of one cache key.
///
/// While alive, invalidations of the key trigger a refetch and garbage
/// collection leaves the entry alone. Dropping it unsubscribes.
pub struct QuerySubscription<T> {
    cache: QueryCache,
    key: QueryKey,
    _value: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for QuerySubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySubscription").field("key", &self.key).finish()
    }
}

impl<T> QuerySubscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn status(&self) -> ReelResult<EntryStatus> {
        Ok(self.cache.status(&self.key)?.unwrap_or(EntryStatus::Idle))
    }

    /// The value currently held, without fetching.
    pub fn peek(&self) -> ReelResult<Option<CacheRead<T>>> {
        self.cache.peek(&self.key)
    }

    pub fn last_error(&self) -> ReelResult<Option<ReelError>> {
        self.cache.last_error(&self.key)
    }

    /// Wait until no fetch is in flight, then return the value or the last error.
    pub async fn settled(&self) -> ReelResult<CacheRead<T>> {
        loop {
            let (in_flight, error, has_value) = {
                let entries = self.cache.lock()?;
                match entries.get(&self.key) {
                    Some(entry) => (
                        entry.in_flight.as_ref().map(|f| f.shared.clone()),
                        entry.error.clone(),
                        entry.value.is_some(),
                    ),
                    None => (None, None, false),
                }
            };

            if let Some(shared) = in_flight {
                let _ = shared.await;
                continue;
            }
            if let Some(error) = error {
                return Err(error);
            }
            if has_value {
                if let Some(read) = self.peek()? {
                    return Ok(read);
                }
                continue;
            }
            return self.refetch().await;
        }
    }

    /// Fetch the key again now, ignoring freshness.
    pub async fn refetch(&self) -> ReelResult<CacheRead<T>> {
        match self.cache.revalidate(&self.key).await? {
            Some(fetched) => {
                let value = downcast::<T>(&self.key, &fetched)?;
                Ok(CacheRead::from_fetch(value, fetched.fetched_at))
            }
            None => Err(CacheError::FetchAborted {
                key: self.key.to_string(),
                reason: "entry no longer cached".to_string(),
            }
            .into()),
        }
    }
}

impl<T> Drop for QuerySubscription<T> {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Resource;
    use reelhouse_core::RemoteError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
        value: u32,
    ) -> FnFetcher<impl Fn() -> BoxFuture<'static, ReelResult<u32>> + Send + Sync + 'static> {
        fetcher_fn(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ReelError>(value)
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_second_read_is_a_hit() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(Resource::ChannelCourses, ["c1"]);

        let first = cache.read(key.clone(), counting_fetcher(calls.clone(), 7)).await.unwrap();
        let second = cache.read(key.clone(), counting_fetcher(calls.clone(), 8)).await.unwrap();

        assert!(first.was_cache_miss());
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.status(&key).unwrap(), Some(EntryStatus::Fresh));
    }

    #[tokio::test]
    async fn test_volatile_resource_refetches_every_read() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(Resource::Comments, ["v1"]);

        cache.read(key.clone(), counting_fetcher(calls.clone(), 1)).await.unwrap();
        cache.read(key.clone(), counting_fetcher(calls.clone(), 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_reported() {
        let cache = QueryCache::default();
        let key = QueryKey::of(Resource::IsStripeConfigured);
        cache
            .read(key.clone(), fetcher_fn(|| async { Ok::<bool, ReelError>(true) }))
            .await
            .unwrap();

        let err = cache.peek::<String>(&key).unwrap_err();
        assert!(matches!(err, ReelError::Cache(CacheError::TypeMismatch { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_errors_fail_fast() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(Resource::Course, ["k1"]);
        let counter = calls.clone();

        let result = cache
            .read(
                key.clone(),
                fetcher_fn(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, ReelError>(CacheError::LockPoisoned.into())
                    }
                }),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.status(&key).unwrap(), Some(EntryStatus::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_errors_retry_then_surface() {
        let policies = PolicyTable::standard().with_retry_delay(Duration::from_millis(50));
        let cache = QueryCache::new(policies);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = cache
            .read(
                QueryKey::of(Resource::AllVideos),
                fetcher_fn(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, ReelError>(RemoteError::rejected("getVideosByCategory", "down").into())
                    }
                }),
            )
            .await;

        assert!(matches!(result, Err(ReelError::Remote(_))));
        // One attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.stats().unwrap().retries, 2);
    }

    #[tokio::test]
    async fn test_subscription_drop_releases() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::of(Resource::PublicPlaylists);

        let sub = cache.subscribe(key.clone(), counting_fetcher(calls.clone(), 4)).unwrap();
        assert_eq!(cache.subscriber_count(&key).unwrap(), 1);
        assert_eq!(sub.settled().await.unwrap().into_value(), 4);

        drop(sub);
        assert_eq!(cache.subscriber_count(&key).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_keeps_subscribers_but_drops_values() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let watched = QueryKey::of(Resource::UserPlaylists);
        let unwatched = QueryKey::of(Resource::FollowedChannels);

        let sub = cache.subscribe(watched.clone(), counting_fetcher(calls.clone(), 1)).unwrap();
        sub.settled().await.unwrap();
        cache.read(unwatched.clone(), counting_fetcher(calls.clone(), 2)).await.unwrap();

        assert_eq!(cache.clear().unwrap(), 1);
        assert!(!cache.contains(&unwatched).unwrap());
        assert_eq!(sub.status().unwrap(), EntryStatus::Idle);
        assert!(sub.peek().unwrap().is_none());

        // The subscriber can still pull a fresh value.
        assert_eq!(sub.settled().await.unwrap().into_value(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
