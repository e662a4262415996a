//! Data-access cache layer for the Reelhouse client.
//!
//! Reads go through a keyed cache that holds at most one in-flight fetch per
//! key; concurrent requesters join it instead of issuing their own call.
//! Writes declare, through an [`InvalidationGraph`], exactly which read
//! resources they make stale.
//!
//! # Design Philosophy
//!
//! Staleness is explicit. Each resource carries a [`ResourcePolicy`]
//! (revalidate on mount, stale time, retry count, retention) in a single
//! [`PolicyTable`], and every read returns a [`CacheRead<T>`] that says
//! whether the value came from cache and whether it is stale.
//!
//! Reads with unmet preconditions are never scheduled. They report a typed
//! [`NotReady`] reason through [`QueryOutcome`], which is distinct from both
//! an error and a pending fetch.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::new(PolicyTable::standard());
//! let key = QueryKey::new(Resource::ChannelVideos, ["c1"]);
//!
//! // Two concurrent reads share one remote call.
//! let (a, b) = tokio::join!(
//!     cache.read(key.clone(), fetcher_fn(|| async { backend.get_channel_videos("c1").await })),
//!     cache.read(key.clone(), fetcher_fn(|| async { backend.get_channel_videos("c1").await })),
//! );
//!
//! // After a successful upload, invalidate what the graph says it touches.
//! let targets = graph.resolve(MutationKind::UploadVideo, &MutationScope::new().channel("c1"));
//! cache.invalidate(&targets).await?;
//! ```

pub mod freshness;
pub mod gc;
pub mod graph;
pub mod key;
pub mod policy;
pub mod precondition;
pub mod query_cache;
pub mod stats;

pub use freshness::{CacheRead, EntryStatus};
pub use gc::{spawn_gc_task, GcConfig};
pub use graph::{Edge, InvalidationGraph, MutationKind, MutationScope, Scope};
pub use key::{QueryKey, Resource, Target};
pub use policy::{PolicyTable, ResourcePolicy};
pub use precondition::{NotReady, Preconditions, QueryOutcome};
pub use query_cache::{
    fetcher_fn, FnFetcher, InvalidationReport, QueryCache, QueryFetcher, QuerySubscription,
};
pub use stats::CacheStats;
