//! Invalidation graph between writes and read resources.
//!
//! Each write declares, as data, the read resources it makes stale and which
//! of its own arguments scopes each of them. Nothing is inferred from key
//! naming.

use crate::key::{Resource, Target};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Every write operation the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    SaveCallerUserProfile,
    UpdateCallerUserProfile,
    AssignCallerUserRole,
    UploadVideo,
    UpdateVideo,
    ToggleVideoPrivacy,
    DeleteVideo,
    LikeVideo,
    AddComment,
    CreateChannel,
    UpdateChannel,
    FollowChannel,
    UnfollowChannel,
    CreateMembershipTier,
    UpdateMembershipTier,
    DeleteMembershipTier,
    CreateSubscription,
    CancelSubscription,
    CreateCourse,
    UpdateCourse,
    DeleteCourse,
    CreatePlaylist,
    UpdatePlaylist,
    DeletePlaylist,
    RecordDonation,
    CreateStripeAccount,
    UpdateStripeAccount,
    DeleteStripeAccount,
    ConnectChannelToStripeAccount,
    SetStripeConfiguration,
    CreateCheckoutSession,
}

impl MutationKind {
    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::SaveCallerUserProfile => "saveCallerUserProfile",
            MutationKind::UpdateCallerUserProfile => "updateCallerUserProfile",
            MutationKind::AssignCallerUserRole => "assignCallerUserRole",
            MutationKind::UploadVideo => "uploadVideo",
            MutationKind::UpdateVideo => "updateVideo",
            MutationKind::ToggleVideoPrivacy => "toggleVideoPrivacy",
            MutationKind::DeleteVideo => "deleteVideo",
            MutationKind::LikeVideo => "likeVideo",
            MutationKind::AddComment => "addComment",
            MutationKind::CreateChannel => "createChannel",
            MutationKind::UpdateChannel => "updateChannel",
            MutationKind::FollowChannel => "followChannel",
            MutationKind::UnfollowChannel => "unfollowChannel",
            MutationKind::CreateMembershipTier => "createMembershipTier",
            MutationKind::UpdateMembershipTier => "updateMembershipTier",
            MutationKind::DeleteMembershipTier => "deleteMembershipTier",
            MutationKind::CreateSubscription => "createSubscription",
            MutationKind::CancelSubscription => "cancelSubscription",
            MutationKind::CreateCourse => "createCourse",
            MutationKind::UpdateCourse => "updateCourse",
            MutationKind::DeleteCourse => "deleteCourse",
            MutationKind::CreatePlaylist => "createPlaylist",
            MutationKind::UpdatePlaylist => "updatePlaylist",
            MutationKind::DeletePlaylist => "deletePlaylist",
            MutationKind::RecordDonation => "recordDonation",
            MutationKind::CreateStripeAccount => "createStripeAccount",
            MutationKind::UpdateStripeAccount => "updateStripeAccount",
            MutationKind::DeleteStripeAccount => "deleteStripeAccount",
            MutationKind::ConnectChannelToStripeAccount => "connectChannelToStripeAccount",
            MutationKind::SetStripeConfiguration => "setStripeConfiguration",
            MutationKind::CreateCheckoutSession => "createCheckoutSession",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which argument of a write parameterizes an invalidated resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every key of the resource.
    Every,
    Channel,
    Video,
    Course,
    Playlist,
    StripeAccount,
}

/// One dependency: the write makes `resource` stale, narrowed by `scope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub resource: Resource,
    pub scope: Scope,
}

impl Edge {
    pub const fn every(resource: Resource) -> Self {
        Self {
            resource,
            scope: Scope::Every,
        }
    }

    pub const fn scoped(resource: Resource, scope: Scope) -> Self {
        Self { resource, scope }
    }
}

/// Argument values of one write, used to narrow scoped edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationScope {
    channel: Option<String>,
    video: Option<String>,
    course: Option<String>,
    playlist: Option<String>,
    stripe_account: Option<String>,
}

impl MutationScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel = Some(channel_id.into());
        self
    }

    pub fn video(mut self, video_id: impl Into<String>) -> Self {
        self.video = Some(video_id.into());
        self
    }

    pub fn course(mut self, course_id: impl Into<String>) -> Self {
        self.course = Some(course_id.into());
        self
    }

    pub fn playlist(mut self, playlist_id: impl Into<String>) -> Self {
        self.playlist = Some(playlist_id.into());
        self
    }

    pub fn stripe_account(mut self, account_id: impl Into<String>) -> Self {
        self.stripe_account = Some(account_id.into());
        self
    }

    fn value(&self, scope: Scope) -> Option<&str> {
        match scope {
            Scope::Every => None,
            Scope::Channel => self.channel.as_deref(),
            Scope::Video => self.video.as_deref(),
            Scope::Course => self.course.as_deref(),
            Scope::Playlist => self.playlist.as_deref(),
            Scope::StripeAccount => self.stripe_account.as_deref(),
        }
    }
}

// Every list of videos, whatever its filter.
const VIDEO_LISTS: [Edge; 3] = [
    Edge::every(Resource::AllVideos),
    Edge::every(Resource::VideosByCategory),
    Edge::every(Resource::VideoSearch),
];

// A single video record, in both of its shapes.
const VIDEO_RECORD: [Edge; 2] = [
    Edge::scoped(Resource::Video, Scope::Video),
    Edge::scoped(Resource::FullVideo, Scope::Video),
];

fn join(parts: &[&[Edge]]) -> Vec<Edge> {
    parts.concat()
}

/// Data table from write to the edges it invalidates.
#[derive(Debug, Clone)]
pub struct InvalidationGraph {
    edges: HashMap<MutationKind, Vec<Edge>>,
}

impl Default for InvalidationGraph {
    fn default() -> Self {
        Self::standard()
    }
}

impl InvalidationGraph {
    /// An empty graph: no write invalidates anything.
    pub fn empty() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    /// The dependencies between the backend's writes and reads.
    pub fn standard() -> Self {
        use MutationKind as M;
        use Resource as R;

        let profile = vec![Edge::every(R::CurrentUserProfile)];
        let profile_update = vec![
            Edge::every(R::CurrentUserProfile),
            Edge::every(R::UserProfile),
            Edge::every(R::Comments),
            Edge::every(R::Channel),
            Edge::every(R::UserChannels),
        ];
        let role = vec![Edge::every(R::CallerUserRole), Edge::every(R::IsCallerAdmin)];

        let channel_videos = [Edge::scoped(R::ChannelVideos, Scope::Channel)];
        let upload = join(&[
            &VIDEO_LISTS,
            &channel_videos,
            &[Edge::every(R::UserChannels)],
        ]);
        let update_video = join(&[&VIDEO_RECORD, &VIDEO_LISTS, &channel_videos]);
        let touch_video = join(&[&VIDEO_RECORD, &VIDEO_LISTS]);
        let delete_video = join(&[&VIDEO_LISTS, &channel_videos, &VIDEO_RECORD]);

        let channel = vec![
            Edge::scoped(R::Channel, Scope::Channel),
            Edge::every(R::UserChannels),
        ];
        let follow = vec![
            Edge::every(R::FollowedChannels),
            Edge::scoped(R::IsFollowing, Scope::Channel),
            Edge::scoped(R::ChannelFollowers, Scope::Channel),
        ];
        let tiers = vec![Edge::scoped(R::MembershipTiers, Scope::Channel)];
        let subscription = vec![
            Edge::scoped(R::HasActiveSubscription, Scope::Channel),
            Edge::scoped(R::UserSubscriptionTierLevel, Scope::Channel),
        ];

        let playlists = vec![Edge::every(R::UserPlaylists), Edge::every(R::PublicPlaylists)];
        let playlist_record = vec![
            Edge::scoped(R::Playlist, Scope::Playlist),
            Edge::every(R::UserPlaylists),
            Edge::every(R::PublicPlaylists),
        ];

        let stripe_account = vec![
            Edge::scoped(R::StripeAccount, Scope::StripeAccount),
            Edge::every(R::UserStripeAccounts),
        ];

        let edges = HashMap::from([
            (M::SaveCallerUserProfile, profile),
            (M::UpdateCallerUserProfile, profile_update),
            (M::AssignCallerUserRole, role),
            (M::UploadVideo, upload),
            (M::UpdateVideo, update_video),
            (M::ToggleVideoPrivacy, touch_video.clone()),
            (M::LikeVideo, touch_video),
            (M::DeleteVideo, delete_video),
            (M::AddComment, vec![Edge::scoped(R::Comments, Scope::Video)]),
            (M::CreateChannel, channel.clone()),
            (M::UpdateChannel, channel),
            (M::FollowChannel, follow.clone()),
            (M::UnfollowChannel, follow),
            (M::CreateMembershipTier, tiers.clone()),
            (M::UpdateMembershipTier, tiers.clone()),
            (M::DeleteMembershipTier, tiers),
            (M::CreateSubscription, subscription.clone()),
            (M::CancelSubscription, subscription),
            (M::CreateCourse, vec![Edge::scoped(R::ChannelCourses, Scope::Channel)]),
            (
                M::UpdateCourse,
                vec![
                    Edge::scoped(R::Course, Scope::Course),
                    Edge::scoped(R::ChannelCourses, Scope::Channel),
                    Edge::every(R::PersonalizedCourses),
                ],
            ),
            (
                M::DeleteCourse,
                vec![
                    Edge::scoped(R::ChannelCourses, Scope::Channel),
                    Edge::scoped(R::Course, Scope::Course),
                ],
            ),
            (M::CreatePlaylist, playlists),
            (M::UpdatePlaylist, playlist_record.clone()),
            (M::DeletePlaylist, playlist_record),
            (
                M::RecordDonation,
                vec![
                    Edge::scoped(R::ChannelDonations, Scope::Channel),
                    Edge::every(R::UserDonationHistory),
                ],
            ),
            (M::CreateStripeAccount, vec![Edge::every(R::UserStripeAccounts)]),
            (M::UpdateStripeAccount, stripe_account.clone()),
            (M::DeleteStripeAccount, stripe_account),
            (
                M::ConnectChannelToStripeAccount,
                vec![Edge::scoped(R::ChannelStripeConnection, Scope::Channel)],
            ),
            (M::SetStripeConfiguration, vec![Edge::every(R::IsStripeConfigured)]),
            (M::CreateCheckoutSession, Vec::new()),
        ]);

        Self { edges }
    }

    /// Edges declared for `kind`. Unknown writes invalidate nothing.
    pub fn edges(&self, kind: MutationKind) -> &[Edge] {
        self.edges.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the edges of one write.
    pub fn with_edges(mut self, kind: MutationKind, edges: Vec<Edge>) -> Self {
        self.edges.insert(kind, edges);
        self
    }

    /// Turn the edges of `kind` into concrete targets for one write.
    ///
    /// A scoped edge whose argument is missing from `scope` widens to every
    /// key of its resource.
    pub fn resolve(&self, kind: MutationKind, scope: &MutationScope) -> Vec<Target> {
        let mut targets: Vec<Target> = Vec::new();
        for edge in self.edges(kind) {
            let target = match (edge.scope, scope.value(edge.scope)) {
                (Scope::Every, _) => Target::all(edge.resource),
                (_, Some(value)) => Target::scoped(edge.resource, value),
                (missing, None) => {
                    warn!(
                        mutation = %kind,
                        resource = %edge.resource,
                        scope = ?missing,
                        "Scoped invalidation missing its argument, widening to every key"
                    );
                    Target::all(edge.resource)
                }
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }
}
