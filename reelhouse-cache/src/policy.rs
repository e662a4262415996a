//! Per-resource cache policy.
//!
//! Every read resource has exactly one [`ResourcePolicy`] in the
//! [`PolicyTable`]. Call sites never carry their own staleness or retry
//! literals.

use crate::key::Resource;
use std::collections::HashMap;
use std::time::Duration;

/// Default fixed delay between read retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default retry count for resources without an override.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// How long an unsubscribed entry is kept before garbage collection.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Stale time of a channel profile.
const CHANNEL_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Caching behavior for one read resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePolicy {
    /// Whether a new subscriber triggers a refetch of a stale value.
    pub revalidate_on_mount: bool,
    /// How many times a failed remote read is retried before the error surfaces.
    pub retry_count: u32,
    /// Fixed delay between retries.
    pub retry_delay: Duration,
    /// Age after which a value is stale. `None` keeps it fresh until invalidated.
    pub stale_time: Option<Duration>,
    /// How long the entry survives without subscribers.
    pub retention: Duration,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            revalidate_on_mount: false,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            stale_time: None,
            retention: DEFAULT_RETENTION,
        }
    }
}

impl ResourcePolicy {
    /// Cached until explicitly invalidated.
    pub fn cached() -> Self {
        Self::default()
    }

    /// Stale as soon as it is fetched and refetched whenever a view mounts.
    pub fn volatile() -> Self {
        Self {
            revalidate_on_mount: true,
            stale_time: Some(Duration::ZERO),
            ..Self::default()
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_stale_time(mut self, stale_time: Option<Duration>) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_revalidate_on_mount(mut self, revalidate: bool) -> Self {
        self.revalidate_on_mount = revalidate;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Whether a value of the given age is still fresh.
    pub fn is_fresh(&self, age: Duration) -> bool {
        match self.stale_time {
            None => true,
            Some(stale_time) => age < stale_time,
        }
    }
}

/// Explicit mapping from resource to its policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: HashMap<Resource, ResourcePolicy>,
    fallback: ResourcePolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PolicyTable {
    /// The policies the client ships with.
    pub fn standard() -> Self {
        let mut policies = HashMap::new();

        for resource in [
            Resource::VideosByCategory,
            Resource::VideoSearch,
            Resource::Comments,
            Resource::UserChannels,
            Resource::ChannelVideos,
        ] {
            policies.insert(resource, ResourcePolicy::volatile());
        }
        policies.insert(Resource::AllVideos, ResourcePolicy::volatile().with_retry_count(2));
        policies.insert(Resource::Video, ResourcePolicy::volatile().with_retry_count(1));
        policies.insert(
            Resource::Channel,
            ResourcePolicy::cached()
                .with_revalidate_on_mount(true)
                .with_stale_time(Some(CHANNEL_STALE_TIME)),
        );
        policies.insert(Resource::CurrentUserProfile, ResourcePolicy::cached().with_retry_count(0));

        Self {
            policies,
            fallback: ResourcePolicy::cached(),
        }
    }

    /// Policy for `resource`.
    pub fn get(&self, resource: Resource) -> &ResourcePolicy {
        self.policies.get(&resource).unwrap_or(&self.fallback)
    }

    /// Replace the policy of one resource.
    pub fn with_policy(mut self, resource: Resource, policy: ResourcePolicy) -> Self {
        self.policies.insert(resource, policy);
        self
    }

    /// Change the retry delay of every resource.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.fallback.retry_delay = delay;
        for policy in self.policies.values_mut() {
            policy.retry_delay = delay;
        }
        self
    }

    /// Change the retention window of every resource.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.fallback.retention = retention;
        for policy in self.policies.values_mut() {
            policy.retention = retention;
        }
        self
    }

    /// Apply `f` to the policy of `resource`, starting from its current value.
    pub fn update<F>(mut self, resource: Resource, f: F) -> Self
    where
        F: FnOnce(ResourcePolicy) -> ResourcePolicy,
    {
        let current = self.get(resource).clone();
        self.policies.insert(resource, f(current));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volatile_resources_are_stale_immediately() {
        let table = PolicyTable::standard();
        for resource in [
            Resource::AllVideos,
            Resource::Video,
            Resource::VideosByCategory,
            Resource::VideoSearch,
            Resource::Comments,
            Resource::UserChannels,
            Resource::ChannelVideos,
        ] {
            let policy = table.get(resource);
            assert!(policy.revalidate_on_mount, "{resource}");
            assert!(!policy.is_fresh(Duration::ZERO), "{resource}");
        }
    }

    #[test]
    fn test_retry_overrides() {
        let table = PolicyTable::standard();
        assert_eq!(table.get(Resource::AllVideos).retry_count, 2);
        assert_eq!(table.get(Resource::AllVideos).retry_delay, Duration::from_secs(1));
        assert_eq!(table.get(Resource::Video).retry_count, 1);
        assert_eq!(table.get(Resource::CurrentUserProfile).retry_count, 0);
        assert_eq!(table.get(Resource::MembershipTiers).retry_count, DEFAULT_RETRY_COUNT);
    }

    #[test]
    fn test_channel_profile_stale_after_five_minutes() {
        let policy = PolicyTable::standard().get(Resource::Channel).clone();
        assert!(policy.is_fresh(Duration::from_secs(299)));
        assert!(!policy.is_fresh(Duration::from_secs(300)));
    }

    #[test]
    fn test_fallback_is_cached_until_invalidated() {
        let table = PolicyTable::standard();
        let policy = table.get(Resource::ChannelCourses);
        assert!(!policy.revalidate_on_mount);
        assert!(policy.is_fresh(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_table_wide_overrides() {
        let table = PolicyTable::standard()
            .with_retry_delay(Duration::from_millis(10))
            .with_retention(Duration::from_secs(1))
            .update(Resource::Course, |p| p.with_retry_count(0));

        assert_eq!(table.get(Resource::Video).retry_delay, Duration::from_millis(10));
        assert_eq!(table.get(Resource::Playlist).retry_delay, Duration::from_millis(10));
        assert_eq!(table.get(Resource::Playlist).retention, Duration::from_secs(1));
        assert_eq!(table.get(Resource::Course).retry_count, 0);
        assert_eq!(table.get(Resource::Course).retry_delay, Duration::from_millis(10));
    }
}
