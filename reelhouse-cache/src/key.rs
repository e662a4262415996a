//! Query keys and invalidation targets.
//!
//! A [`QueryKey`] names one cached read: the logical resource plus the
//! parameters it was called with. A [`Target`] selects the keys a write
//! makes stale. Targets are built from the invalidation graph, never from
//! string prefixes, so matching is exact on the resource.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when rendering a key for logs.
const SEPARATOR: char = ':';

/// Every read resource the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    CurrentUserProfile,
    UserProfile,
    CallerUserRole,
    IsCallerAdmin,
    AllVideos,
    Video,
    FullVideo,
    VideosByCategory,
    VideoSearch,
    Comments,
    Channel,
    UserChannels,
    ChannelVideos,
    IsFollowing,
    FollowedChannels,
    ChannelFollowers,
    MembershipTiers,
    UserSubscriptionTierLevel,
    HasActiveSubscription,
    ChannelCourses,
    Course,
    PersonalizedCourses,
    UserPlaylists,
    PublicPlaylists,
    Playlist,
    ChannelDonations,
    UserDonationHistory,
    UserStripeAccounts,
    StripeAccount,
    ChannelStripeConnection,
    IsStripeConfigured,
    StripeSessionStatus,
}

impl Resource {
    pub const ALL: [Resource; 32] = [
        Resource::CurrentUserProfile,
        Resource::UserProfile,
        Resource::CallerUserRole,
        Resource::IsCallerAdmin,
        Resource::AllVideos,
        Resource::Video,
        Resource::FullVideo,
        Resource::VideosByCategory,
        Resource::VideoSearch,
        Resource::Comments,
        Resource::Channel,
        Resource::UserChannels,
        Resource::ChannelVideos,
        Resource::IsFollowing,
        Resource::FollowedChannels,
        Resource::ChannelFollowers,
        Resource::MembershipTiers,
        Resource::UserSubscriptionTierLevel,
        Resource::HasActiveSubscription,
        Resource::ChannelCourses,
        Resource::Course,
        Resource::PersonalizedCourses,
        Resource::UserPlaylists,
        Resource::PublicPlaylists,
        Resource::Playlist,
        Resource::ChannelDonations,
        Resource::UserDonationHistory,
        Resource::UserStripeAccounts,
        Resource::StripeAccount,
        Resource::ChannelStripeConnection,
        Resource::IsStripeConfigured,
        Resource::StripeSessionStatus,
    ];

    /// Stable name used in logs and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::CurrentUserProfile => "currentUserProfile",
            Resource::UserProfile => "userProfile",
            Resource::CallerUserRole => "callerUserRole",
            Resource::IsCallerAdmin => "isCallerAdmin",
            Resource::AllVideos => "allVideos",
            Resource::Video => "video",
            Resource::FullVideo => "fullVideo",
            Resource::VideosByCategory => "videosByCategory",
            Resource::VideoSearch => "videoSearch",
            Resource::Comments => "comments",
            Resource::Channel => "channel",
            Resource::UserChannels => "userChannels",
            Resource::ChannelVideos => "channelVideos",
            Resource::IsFollowing => "isFollowing",
            Resource::FollowedChannels => "followedChannels",
            Resource::ChannelFollowers => "channelFollowers",
            Resource::MembershipTiers => "membershipTiers",
            Resource::UserSubscriptionTierLevel => "userSubscriptionTierLevel",
            Resource::HasActiveSubscription => "hasActiveSubscription",
            Resource::ChannelCourses => "channelCourses",
            Resource::Course => "course",
            Resource::PersonalizedCourses => "personalizedCourses",
            Resource::UserPlaylists => "userPlaylists",
            Resource::PublicPlaylists => "publicPlaylists",
            Resource::Playlist => "playlist",
            Resource::ChannelDonations => "channelDonations",
            Resource::UserDonationHistory => "userDonationHistory",
            Resource::UserStripeAccounts => "userStripeAccounts",
            Resource::StripeAccount => "stripeAccount",
            Resource::ChannelStripeConnection => "channelStripeConnection",
            Resource::IsStripeConfigured => "isStripeConfigured",
            Resource::StripeSessionStatus => "stripeSessionStatus",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.name() == name)
    }

    /// Resources whose answer depends on who the caller is.
    ///
    /// These are only read for an authenticated caller.
    pub fn is_caller_scoped(&self) -> bool {
        matches!(
            self,
            Resource::CurrentUserProfile
                | Resource::CallerUserRole
                | Resource::IsCallerAdmin
                | Resource::UserChannels
                | Resource::IsFollowing
                | Resource::FollowedChannels
                | Resource::UserSubscriptionTierLevel
                | Resource::HasActiveSubscription
                | Resource::PersonalizedCourses
                | Resource::UserPlaylists
                | Resource::UserDonationHistory
                | Resource::UserStripeAccounts
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies one cached read: resource name plus parameter tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    resource: Resource,
    params: Vec<String>,
}

impl QueryKey {
    pub fn new<I, S>(resource: Resource, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource,
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Key for a parameterless resource.
    pub fn of(resource: Resource) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for param in &self.params {
            write!(f, "{}{}", SEPARATOR, param)?;
        }
        Ok(())
    }
}

/// Selects cache keys to invalidate.
///
/// With `params: None` every key of the resource matches. Otherwise the
/// key's parameters must begin with the target's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub resource: Resource,
    pub params: Option<Vec<String>>,
}

impl Target {
    /// Every key of `resource`.
    pub fn all(resource: Resource) -> Self {
        Self {
            resource,
            params: None,
        }
    }

    /// Keys of `resource` scoped to a single parameter, e.g. one channel.
    pub fn scoped(resource: Resource, param: impl Into<String>) -> Self {
        Self {
            resource,
            params: Some(vec![param.into()]),
        }
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        if self.resource != key.resource {
            return false;
        }
        match &self.params {
            None => true,
            Some(params) => key.params.starts_with(params),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            None => write!(f, "{}{}*", self.resource, SEPARATOR),
            Some(params) => write!(f, "{}", QueryKey::new(self.resource, params.iter().cloned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_display() {
        let key = QueryKey::new(Resource::ChannelVideos, ["c1"]);
        assert_eq!(key.to_string(), "channelVideos:c1");
        assert_eq!(QueryKey::of(Resource::AllVideos).to_string(), "allVideos");
    }

    #[test]
    fn test_resource_names_round_trip() {
        for resource in Resource::ALL {
            assert_eq!(Resource::from_name(resource.name()), Some(resource));
        }
        assert_eq!(Resource::from_name("videos"), None);
    }

    #[test]
    fn test_scoped_target_only_matches_its_channel() {
        let target = Target::scoped(Resource::ChannelVideos, "C");
        assert!(target.matches(&QueryKey::new(Resource::ChannelVideos, ["C"])));
        assert!(!target.matches(&QueryKey::new(Resource::ChannelVideos, ["D"])));
        assert!(!target.matches(&QueryKey::new(Resource::ChannelCourses, ["C"])));
    }

    #[test]
    fn test_all_target_matches_every_param() {
        let target = Target::all(Resource::VideoSearch);
        assert!(target.matches(&QueryKey::new(Resource::VideoSearch, ["cats"])));
        assert!(target.matches(&QueryKey::new(Resource::VideoSearch, ["dogs"])));
        assert!(!target.matches(&QueryKey::of(Resource::AllVideos)));
    }

    #[test]
    fn test_resources_are_distinct_not_prefixes() {
        // "video" must not match "videoSearch" the way a string prefix would.
        let target = Target::all(Resource::Video);
        assert!(!target.matches(&QueryKey::new(Resource::VideoSearch, ["v"])));
    }

    proptest! {
        #[test]
        fn prop_scoped_target_matches_iff_param_equal(a in "[a-z0-9]{1,8}", b in "[a-z0-9]{1,8}") {
            let target = Target::scoped(Resource::Comments, a.clone());
            let key = QueryKey::new(Resource::Comments, [b.clone()]);
            prop_assert_eq!(target.matches(&key), a == b);
        }
    }
}
