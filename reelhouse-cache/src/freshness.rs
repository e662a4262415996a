//! Freshness metadata carried by cache reads.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Freshness state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Known key, never fetched successfully and nothing in flight.
    Idle,
    /// A fetch is in flight.
    Fetching,
    /// Holds a value within its resource's stale time and not invalidated.
    Fresh,
    /// Holds a value that was invalidated or aged past its stale time.
    Stale,
    /// The last fetch failed.
    Error,
}

/// Result of a cache read, carrying staleness metadata.
///
/// Callers can tell a cached answer from a freshly fetched one and see how
/// old the data is.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The cached value.
    value: T,
    /// When this value was fetched from the backend.
    fetched_at: DateTime<Utc>,
    /// Whether the read was served without a fetch.
    was_cache_hit: bool,
    /// Whether the value is known to be out of date.
    is_stale: bool,
}

impl<T> CacheRead<T> {
    /// A read answered from cache.
    pub fn from_cache(value: T, fetched_at: DateTime<Utc>, is_stale: bool) -> Self {
        Self {
            value,
            fetched_at,
            was_cache_hit: true,
            is_stale,
        }
    }

    /// A read answered by a fetch that just completed.
    pub fn from_fetch(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            fetched_at,
            was_cache_hit: false,
            is_stale: false,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// How long ago the value was fetched.
    pub fn age(&self) -> Duration {
        let now = Utc::now();
        if now > self.fetched_at {
            (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            fetched_at: self.fetched_at,
            was_cache_hit: self.was_cache_hit,
            is_stale: self.is_stale,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
