//! Reelhouse Test Utilities
//!
//! Shared test infrastructure for the Reelhouse workspace:
//! - An in-memory [`MockBackend`] with per-operation call counters, failure
//!   injection and latency gates
//! - Mock factory and identity provider for driving the session lifecycle
//! - Proptest generators and fixtures for domain records

pub use reelhouse_core::{
    Category, Channel, ChannelStripeConnection, Comment, Course, Donation, FullVideo, Identity,
    MembershipTier, Playlist, PlaylistVisibility, Principal, ReelError, ReelResult, RemoteError,
    SessionError, ShoppingItem, StripeAccount, StripeConfiguration, StripeSessionStatus,
    Subscription, SubscriptionStatus, UserProfile, UserRole, VideoMetadata,
};

use async_trait::async_trait;
use reelhouse_client::{Backend, BackendFactory, IdentityProvider};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// GATES
// ============================================================================

/// Holds calls back until opened.
///
/// Used to keep a fetch, build or login in flight while a test drives
/// something else.
#[derive(Debug, Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn pass(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MOCK BACKEND
// ============================================================================

#[derive(Debug, Default)]
struct StoreData {
    profiles: HashMap<Principal, UserProfile>,
    roles: HashMap<Principal, UserRole>,
    videos: BTreeMap<String, VideoMetadata>,
    comments: Vec<Comment>,
    channels: BTreeMap<String, Channel>,
    follows: BTreeSet<(Principal, String)>,
    tiers: BTreeMap<String, MembershipTier>,
    subscriptions: BTreeMap<String, Subscription>,
    courses: BTreeMap<String, Course>,
    playlists: BTreeMap<String, Playlist>,
    donations: Vec<Donation>,
    stripe_accounts: BTreeMap<String, StripeAccount>,
    connections: HashMap<String, ChannelStripeConnection>,
    stripe_config: Option<StripeConfiguration>,
    checkout_sessions: HashMap<String, StripeSessionStatus>,
    next_session: u64,
}

#[derive(Debug, Default)]
struct Controls {
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, String>,
    gates: HashMap<&'static str, Gate>,
}

/// Shared in-memory backend state.
///
/// Every [`MockBackend`] built from one store sees the same records, so a
/// test can log in as different principals against the same data. Clones
/// share state.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    data: Arc<Mutex<StoreData>>,
    controls: Arc<Mutex<Controls>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend acting as `caller`.
    pub fn backend_for(&self, caller: Principal) -> MockBackend {
        MockBackend {
            store: self.clone(),
            caller,
        }
    }

    /// Number of calls made to `operation` (camelCase backend name).
    pub fn calls(&self, operation: &str) -> usize {
        lock(&self.controls).calls.get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.controls).calls.values().sum()
    }

    pub fn reset_calls(&self) {
        lock(&self.controls).calls.clear();
    }

    /// Make every subsequent call to `operation` fail with a rejection.
    pub fn fail(&self, operation: &'static str, message: impl Into<String>) {
        lock(&self.controls).failures.insert(operation, message.into());
    }

    pub fn succeed(&self, operation: &'static str) {
        lock(&self.controls).failures.remove(operation);
    }

    /// Hold calls to `operation` until the returned gate opens.
    pub fn hold(&self, operation: &'static str) -> Gate {
        let gate = Gate::new();
        lock(&self.controls).gates.insert(operation, gate.clone());
        gate
    }

    /// Remove and open the gate on `operation`.
    pub fn release(&self, operation: &'static str) {
        if let Some(gate) = lock(&self.controls).gates.remove(operation) {
            gate.open();
        }
    }

    fn data(&self) -> MutexGuard<'_, StoreData> {
        lock(&self.data)
    }

    // --- seeding ---

    pub fn insert_profile(&self, principal: Principal, profile: UserProfile) {
        self.data().profiles.insert(principal, profile);
    }

    pub fn set_role(&self, principal: Principal, role: UserRole) {
        self.data().roles.insert(principal, role);
    }

    pub fn insert_channel(&self, channel: Channel) {
        self.data().channels.insert(channel.id.clone(), channel);
    }

    pub fn insert_video(&self, video: VideoMetadata) {
        self.data().videos.insert(video.id.clone(), video);
    }

    pub fn insert_comment(&self, comment: Comment) {
        self.data().comments.push(comment);
    }

    pub fn insert_tier(&self, tier: MembershipTier) {
        self.data().tiers.insert(tier.id.clone(), tier);
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.data()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub fn insert_course(&self, course: Course) {
        self.data().courses.insert(course.id.clone(), course);
    }

    pub fn insert_playlist(&self, playlist: Playlist) {
        self.data().playlists.insert(playlist.id.clone(), playlist);
    }

    pub fn insert_donation(&self, donation: Donation) {
        self.data().donations.push(donation);
    }

    pub fn insert_stripe_account(&self, account: StripeAccount) {
        self.data()
            .stripe_accounts
            .insert(account.id.clone(), account);
    }

    pub fn set_checkout_status(&self, session_id: impl Into<String>, status: StripeSessionStatus) {
        self.data().checkout_sessions.insert(session_id.into(), status);
    }

    // --- inspection ---

    pub fn video(&self, video_id: &str) -> Option<VideoMetadata> {
        self.data().videos.get(video_id).cloned()
    }

    pub fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.data().channels.get(channel_id).cloned()
    }

    pub fn video_count(&self) -> usize {
        self.data().videos.len()
    }

    pub fn donation_count(&self) -> usize {
        self.data().donations.len()
    }

    pub fn comment_count(&self) -> usize {
        self.data().comments.len()
    }
}

/// In-memory [`Backend`] bound to one caller.
///
/// Writes require a non-anonymous caller, and writes to a channel's content
/// require the caller to own the channel. Either violation is reported as a
/// rejection, the way the real service reports authorization failures.
#[derive(Debug, Clone)]
pub struct MockBackend {
    store: MockStore,
    caller: Principal,
}

impl MockBackend {
    pub fn caller(&self) -> &Principal {
        &self.caller
    }

    pub fn store(&self) -> &MockStore {
        &self.store
    }

    /// Count the call, wait on any gate, then apply any injected failure.
    async fn enter(&self, operation: &'static str) -> ReelResult<()> {
        let gate = {
            let mut controls = lock(&self.store.controls);
            *controls.calls.entry(operation).or_insert(0) += 1;
            controls.gates.get(operation).cloned()
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let failure = lock(&self.store.controls).failures.get(operation).cloned();
        match failure {
            Some(message) => Err(RemoteError::rejected(operation, message).into()),
            None => Ok(()),
        }
    }

    async fn enter_as_caller(&self, operation: &'static str) -> ReelResult<()> {
        self.enter(operation).await?;
        if self.caller.is_anonymous() {
            return Err(RemoteError::rejected(operation, "Unauthorized: anonymous caller").into());
        }
        Ok(())
    }

    fn require_owner(&self, operation: &'static str, data: &StoreData, channel_id: &str) -> ReelResult<()> {
        match data.channels.get(channel_id) {
            Some(channel) if channel.principal == self.caller => Ok(()),
            Some(_) => Err(RemoteError::rejected(operation, "Unauthorized: only the channel owner").into()),
            None => Err(RemoteError::rejected(operation, format!("Channel {channel_id} not found")).into()),
        }
    }
}

/// Prefix of the redirect URLs returned by [`MockBackend::create_checkout_session`].
pub const CHECKOUT_URL_PREFIX: &str = "https://checkout.stripe.mock/pay/";

fn not_found(operation: &'static str, what: &str, id: &str) -> ReelError {
    RemoteError::rejected(operation, format!("{what} {id} not found")).into()
}

#[async_trait]
impl Backend for MockBackend {
    async fn get_caller_user_profile(&self) -> ReelResult<Option<UserProfile>> {
        self.enter("getCallerUserProfile").await?;
        Ok(self.store.data().profiles.get(&self.caller).cloned())
    }

    async fn get_user_profile(&self, user: &Principal) -> ReelResult<Option<UserProfile>> {
        self.enter("getUserProfile").await?;
        Ok(self.store.data().profiles.get(user).cloned())
    }

    async fn save_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()> {
        self.enter_as_caller("saveCallerUserProfile").await?;
        self.store
            .data()
            .profiles
            .insert(self.caller.clone(), profile.clone());
        Ok(())
    }

    async fn update_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()> {
        self.enter_as_caller("updateCallerUserProfile").await?;
        let mut data = self.store.data();
        match data.profiles.get_mut(&self.caller) {
            Some(existing) => {
                *existing = profile.clone();
                Ok(())
            }
            None => Err(not_found("updateCallerUserProfile", "Profile", self.caller.as_str())),
        }
    }

    async fn get_caller_user_role(&self) -> ReelResult<UserRole> {
        self.enter("getCallerUserRole").await?;
        if self.caller.is_anonymous() {
            return Ok(UserRole::Guest);
        }
        Ok(self
            .store
            .data()
            .roles
            .get(&self.caller)
            .copied()
            .unwrap_or(UserRole::User))
    }

    async fn is_caller_admin(&self) -> ReelResult<bool> {
        self.enter("isCallerAdmin").await?;
        Ok(self.store.data().roles.get(&self.caller) == Some(&UserRole::Admin))
    }

    async fn assign_caller_user_role(&self, user: &Principal, role: UserRole) -> ReelResult<()> {
        self.enter_as_caller("assignCallerUserRole").await?;
        let mut data = self.store.data();
        if data.roles.get(&self.caller) != Some(&UserRole::Admin) {
            return Err(RemoteError::rejected("assignCallerUserRole", "Unauthorized: only admins").into());
        }
        data.roles.insert(user.clone(), role);
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> ReelResult<Option<VideoMetadata>> {
        self.enter("getVideo").await?;
        Ok(self.store.data().videos.get(video_id).cloned())
    }

    async fn get_full_video_metadata(&self, video_id: &str) -> ReelResult<Option<FullVideo>> {
        self.enter("getFullVideoMetadata").await?;
        let data = self.store.data();
        let full = data.videos.get(video_id).and_then(|video| {
            data.channels.get(&video.channel_id).map(|channel| FullVideo {
                video: video.clone(),
                channel: channel.clone(),
            })
        });
        Ok(full)
    }

    async fn get_videos_by_category(&self, category: Category) -> ReelResult<Vec<VideoMetadata>> {
        self.enter("getVideosByCategory").await?;
        Ok(self
            .store
            .data()
            .videos
            .values()
            .filter(|video| video.category == category && !video.is_private)
            .cloned()
            .collect())
    }

    async fn search_videos(&self, term: &str) -> ReelResult<Vec<VideoMetadata>> {
        self.enter("searchVideos").await?;
        let needle = term.to_lowercase();
        Ok(self
            .store
            .data()
            .videos
            .values()
            .filter(|video| !video.is_private)
            .filter(|video| {
                video.title.to_lowercase().contains(&needle)
                    || video.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn upload_video(&self, metadata: &VideoMetadata) -> ReelResult<()> {
        self.enter_as_caller("uploadVideo").await?;
        let mut data = self.store.data();
        self.require_owner("uploadVideo", &data, &metadata.channel_id)?;
        data.videos.insert(metadata.id.clone(), metadata.clone());
        Ok(())
    }

    async fn update_video(&self, video_id: &str, metadata: &VideoMetadata) -> ReelResult<()> {
        self.enter_as_caller("updateVideo").await?;
        let mut data = self.store.data();
        let channel_id = match data.videos.get(video_id) {
            Some(video) => video.channel_id.clone(),
            None => return Err(not_found("updateVideo", "Video", video_id)),
        };
        self.require_owner("updateVideo", &data, &channel_id)?;
        let mut updated = metadata.clone();
        updated.id = video_id.to_string();
        data.videos.insert(video_id.to_string(), updated);
        Ok(())
    }

    async fn toggle_video_privacy(&self, video_id: &str) -> ReelResult<()> {
        self.enter_as_caller("toggleVideoPrivacy").await?;
        let mut data = self.store.data();
        match data.videos.get_mut(video_id) {
            Some(video) => {
                video.is_private = !video.is_private;
                Ok(())
            }
            None => Err(not_found("toggleVideoPrivacy", "Video", video_id)),
        }
    }

    async fn delete_video(&self, video_id: &str) -> ReelResult<()> {
        self.enter_as_caller("deleteVideo").await?;
        let mut data = self.store.data();
        let channel_id = match data.videos.get(video_id) {
            Some(video) => video.channel_id.clone(),
            None => return Err(not_found("deleteVideo", "Video", video_id)),
        };
        self.require_owner("deleteVideo", &data, &channel_id)?;
        data.videos.remove(video_id);
        Ok(())
    }

    async fn like_video(&self, video_id: &str) -> ReelResult<()> {
        self.enter_as_caller("likeVideo").await?;
        let mut data = self.store.data();
        match data.videos.get_mut(video_id) {
            Some(video) => {
                video.like_count += 1;
                Ok(())
            }
            None => Err(not_found("likeVideo", "Video", video_id)),
        }
    }

    async fn get_comments(&self, video_id: &str) -> ReelResult<Vec<Comment>> {
        self.enter("getComments").await?;
        Ok(self
            .store
            .data()
            .comments
            .iter()
            .filter(|comment| comment.video_id == video_id)
            .cloned()
            .collect())
    }

    async fn add_comment(&self, comment: &Comment) -> ReelResult<()> {
        self.enter_as_caller("addComment").await?;
        let mut data = self.store.data();
        if !data.videos.contains_key(&comment.video_id) {
            return Err(not_found("addComment", "Video", &comment.video_id));
        }
        let mut stored = comment.clone();
        stored.author = self.caller.clone();
        data.comments.push(stored);
        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> ReelResult<Option<Channel>> {
        self.enter("getChannel").await?;
        Ok(self.store.data().channels.get(channel_id).cloned())
    }

    async fn get_user_channels(&self) -> ReelResult<Vec<Channel>> {
        self.enter("getUserChannels").await?;
        Ok(self
            .store
            .data()
            .channels
            .values()
            .filter(|channel| channel.principal == self.caller)
            .cloned()
            .collect())
    }

    async fn get_channel_videos(&self, channel_id: &str) -> ReelResult<Vec<VideoMetadata>> {
        self.enter("getChannelVideos").await?;
        Ok(self
            .store
            .data()
            .videos
            .values()
            .filter(|video| video.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn create_channel(&self, channel: &Channel) -> ReelResult<()> {
        self.enter_as_caller("createChannel").await?;
        let mut stored = channel.clone();
        stored.principal = self.caller.clone();
        self.store.data().channels.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn update_channel(&self, channel_id: &str, name: &str, profile: &str) -> ReelResult<()> {
        self.enter_as_caller("updateChannel").await?;
        let mut data = self.store.data();
        self.require_owner("updateChannel", &data, channel_id)?;
        if let Some(channel) = data.channels.get_mut(channel_id) {
            channel.name = name.to_string();
            channel.profile = profile.to_string();
        }
        Ok(())
    }

    async fn is_following_channel(&self, channel_id: &str) -> ReelResult<bool> {
        self.enter("isFollowingChannel").await?;
        Ok(self
            .store
            .data()
            .follows
            .contains(&(self.caller.clone(), channel_id.to_string())))
    }

    async fn get_followed_channels(&self) -> ReelResult<Vec<String>> {
        self.enter("getFollowedChannels").await?;
        Ok(self
            .store
            .data()
            .follows
            .iter()
            .filter(|(follower, _)| *follower == self.caller)
            .map(|(_, channel_id)| channel_id.clone())
            .collect())
    }

    async fn get_channel_followers(&self, channel_id: &str) -> ReelResult<Vec<Principal>> {
        self.enter("getChannelFollowers").await?;
        Ok(self
            .store
            .data()
            .follows
            .iter()
            .filter(|(_, followed)| followed == channel_id)
            .map(|(follower, _)| follower.clone())
            .collect())
    }

    async fn follow_channel(&self, channel_id: &str) -> ReelResult<()> {
        self.enter_as_caller("followChannel").await?;
        let mut data = self.store.data();
        if !data.channels.contains_key(channel_id) {
            return Err(not_found("followChannel", "Channel", channel_id));
        }
        data.follows.insert((self.caller.clone(), channel_id.to_string()));
        Ok(())
    }

    async fn unfollow_channel(&self, channel_id: &str) -> ReelResult<()> {
        self.enter_as_caller("unfollowChannel").await?;
        self.store
            .data()
            .follows
            .remove(&(self.caller.clone(), channel_id.to_string()));
        Ok(())
    }

    async fn get_channel_membership_tiers(&self, channel_id: &str) -> ReelResult<Vec<MembershipTier>> {
        self.enter("getChannelMembershipTiers").await?;
        Ok(self
            .store
            .data()
            .tiers
            .values()
            .filter(|tier| tier.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn get_user_subscription_tier_level(&self, channel_id: &str) -> ReelResult<Option<u64>> {
        self.enter("getUserSubscriptionTierLevel").await?;
        let data = self.store.data();
        Ok(data
            .subscriptions
            .values()
            .filter(|sub| {
                sub.user == self.caller
                    && sub.channel_id == channel_id
                    && sub.status == SubscriptionStatus::Active
            })
            .filter_map(|sub| data.tiers.get(&sub.tier_id).map(|tier| tier.tier_level))
            .max())
    }

    async fn has_active_subscription(&self, channel_id: &str) -> ReelResult<bool> {
        self.enter("hasActiveSubscription").await?;
        Ok(self.store.data().subscriptions.values().any(|sub| {
            sub.user == self.caller
                && sub.channel_id == channel_id
                && sub.status == SubscriptionStatus::Active
        }))
    }

    async fn create_membership_tier(&self, tier: &MembershipTier) -> ReelResult<()> {
        self.enter_as_caller("createMembershipTier").await?;
        let mut data = self.store.data();
        self.require_owner("createMembershipTier", &data, &tier.channel_id)?;
        data.tiers.insert(tier.id.clone(), tier.clone());
        Ok(())
    }

    async fn update_membership_tier(&self, tier_id: &str, tier: &MembershipTier) -> ReelResult<()> {
        self.enter_as_caller("updateMembershipTier").await?;
        let mut data = self.store.data();
        if !data.tiers.contains_key(tier_id) {
            return Err(not_found("updateMembershipTier", "Tier", tier_id));
        }
        self.require_owner("updateMembershipTier", &data, &tier.channel_id)?;
        let mut updated = tier.clone();
        updated.id = tier_id.to_string();
        data.tiers.insert(tier_id.to_string(), updated);
        Ok(())
    }

    async fn delete_membership_tier(&self, tier_id: &str) -> ReelResult<()> {
        self.enter_as_caller("deleteMembershipTier").await?;
        let mut data = self.store.data();
        let channel_id = match data.tiers.get(tier_id) {
            Some(tier) => tier.channel_id.clone(),
            None => return Err(not_found("deleteMembershipTier", "Tier", tier_id)),
        };
        self.require_owner("deleteMembershipTier", &data, &channel_id)?;
        data.tiers.remove(tier_id);
        Ok(())
    }

    async fn create_subscription(&self, subscription: &Subscription) -> ReelResult<()> {
        self.enter_as_caller("createSubscription").await?;
        let mut data = self.store.data();
        if !data.tiers.contains_key(&subscription.tier_id) {
            return Err(not_found("createSubscription", "Tier", &subscription.tier_id));
        }
        let mut stored = subscription.clone();
        stored.user = self.caller.clone();
        data.subscriptions.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> ReelResult<()> {
        self.enter_as_caller("cancelSubscription").await?;
        let mut data = self.store.data();
        match data.subscriptions.get_mut(subscription_id) {
            Some(sub) if sub.user == self.caller => {
                sub.status = SubscriptionStatus::Canceled;
                Ok(())
            }
            Some(_) => Err(RemoteError::rejected("cancelSubscription", "Unauthorized: not the subscriber").into()),
            None => Err(not_found("cancelSubscription", "Subscription", subscription_id)),
        }
    }

    async fn get_channel_courses(&self, channel_id: &str) -> ReelResult<Vec<Course>> {
        self.enter("getChannelCourses").await?;
        Ok(self
            .store
            .data()
            .courses
            .values()
            .filter(|course| course.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn get_course(&self, course_id: &str) -> ReelResult<Option<Course>> {
        self.enter("getCourse").await?;
        Ok(self.store.data().courses.get(course_id).cloned())
    }

    async fn get_personalized_courses(&self) -> ReelResult<Vec<Course>> {
        self.enter("getPersonalizedCourses").await?;
        let data = self.store.data();
        Ok(data
            .courses
            .values()
            .filter(|course| course.is_visible)
            .filter(|course| {
                data.follows
                    .contains(&(self.caller.clone(), course.channel_id.clone()))
            })
            .cloned()
            .collect())
    }

    async fn create_course(&self, course: &Course) -> ReelResult<()> {
        self.enter_as_caller("createCourse").await?;
        let mut data = self.store.data();
        self.require_owner("createCourse", &data, &course.channel_id)?;
        data.courses.insert(course.id.clone(), course.clone());
        Ok(())
    }

    async fn update_course(&self, course_id: &str, course: &Course) -> ReelResult<()> {
        self.enter_as_caller("updateCourse").await?;
        let mut data = self.store.data();
        if !data.courses.contains_key(course_id) {
            return Err(not_found("updateCourse", "Course", course_id));
        }
        self.require_owner("updateCourse", &data, &course.channel_id)?;
        let mut updated = course.clone();
        updated.id = course_id.to_string();
        data.courses.insert(course_id.to_string(), updated);
        Ok(())
    }

    async fn delete_course(&self, course_id: &str) -> ReelResult<()> {
        self.enter_as_caller("deleteCourse").await?;
        let mut data = self.store.data();
        let channel_id = match data.courses.get(course_id) {
            Some(course) => course.channel_id.clone(),
            None => return Err(not_found("deleteCourse", "Course", course_id)),
        };
        self.require_owner("deleteCourse", &data, &channel_id)?;
        data.courses.remove(course_id);
        Ok(())
    }

    async fn get_user_playlists(&self) -> ReelResult<Vec<Playlist>> {
        self.enter("getUserPlaylists").await?;
        Ok(self
            .store
            .data()
            .playlists
            .values()
            .filter(|playlist| playlist.creator == self.caller)
            .cloned()
            .collect())
    }

    async fn get_public_playlists(&self) -> ReelResult<Vec<Playlist>> {
        self.enter("getPublicPlaylists").await?;
        Ok(self
            .store
            .data()
            .playlists
            .values()
            .filter(|playlist| playlist.visibility == PlaylistVisibility::PublicVisibility)
            .cloned()
            .collect())
    }

    async fn get_playlist(&self, playlist_id: &str) -> ReelResult<Option<Playlist>> {
        self.enter("getPlaylist").await?;
        Ok(self.store.data().playlists.get(playlist_id).cloned())
    }

    async fn create_playlist(&self, playlist: &Playlist) -> ReelResult<()> {
        self.enter_as_caller("createPlaylist").await?;
        let mut stored = playlist.clone();
        stored.creator = self.caller.clone();
        self.store.data().playlists.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn update_playlist(&self, playlist_id: &str, playlist: &Playlist) -> ReelResult<()> {
        self.enter_as_caller("updatePlaylist").await?;
        let mut data = self.store.data();
        match data.playlists.get(playlist_id) {
            Some(existing) if existing.creator == self.caller => {}
            Some(_) => return Err(RemoteError::rejected("updatePlaylist", "Unauthorized: not the creator").into()),
            None => return Err(not_found("updatePlaylist", "Playlist", playlist_id)),
        }
        let mut updated = playlist.clone();
        updated.id = playlist_id.to_string();
        updated.creator = self.caller.clone();
        data.playlists.insert(playlist_id.to_string(), updated);
        Ok(())
    }

    async fn delete_playlist(&self, playlist_id: &str) -> ReelResult<()> {
        self.enter_as_caller("deletePlaylist").await?;
        let mut data = self.store.data();
        match data.playlists.get(playlist_id) {
            Some(existing) if existing.creator == self.caller => {
                data.playlists.remove(playlist_id);
                Ok(())
            }
            Some(_) => Err(RemoteError::rejected("deletePlaylist", "Unauthorized: not the creator").into()),
            None => Err(not_found("deletePlaylist", "Playlist", playlist_id)),
        }
    }

    async fn get_channel_donations(&self, channel_id: &str) -> ReelResult<Vec<Donation>> {
        self.enter("getChannelDonations").await?;
        Ok(self
            .store
            .data()
            .donations
            .iter()
            .filter(|donation| donation.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn get_user_donation_history(&self) -> ReelResult<Vec<Donation>> {
        self.enter("getUserDonationHistory").await?;
        Ok(self
            .store
            .data()
            .donations
            .iter()
            .filter(|donation| donation.donor == self.caller)
            .cloned()
            .collect())
    }

    async fn record_donation(&self, donation: &Donation) -> ReelResult<()> {
        self.enter_as_caller("recordDonation").await?;
        let mut data = self.store.data();
        if !data.channels.contains_key(&donation.channel_id) {
            return Err(not_found("recordDonation", "Channel", &donation.channel_id));
        }
        let mut stored = donation.clone();
        stored.donor = self.caller.clone();
        data.donations.push(stored);
        Ok(())
    }

    async fn get_user_stripe_accounts(&self) -> ReelResult<Vec<StripeAccount>> {
        self.enter("getUserStripeAccounts").await?;
        Ok(self
            .store
            .data()
            .stripe_accounts
            .values()
            .filter(|account| account.owner == self.caller)
            .cloned()
            .collect())
    }

    async fn get_stripe_account(&self, account_id: &str) -> ReelResult<Option<StripeAccount>> {
        self.enter("getStripeAccount").await?;
        Ok(self.store.data().stripe_accounts.get(account_id).cloned())
    }

    async fn create_stripe_account(&self, account: &StripeAccount) -> ReelResult<()> {
        self.enter_as_caller("createStripeAccount").await?;
        let mut stored = account.clone();
        stored.owner = self.caller.clone();
        self.store
            .data()
            .stripe_accounts
            .insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn update_stripe_account(&self, account_id: &str, account: &StripeAccount) -> ReelResult<()> {
        self.enter_as_caller("updateStripeAccount").await?;
        let mut data = self.store.data();
        match data.stripe_accounts.get(account_id) {
            Some(existing) if existing.owner == self.caller => {}
            Some(_) => return Err(RemoteError::rejected("updateStripeAccount", "Unauthorized: not the owner").into()),
            None => return Err(not_found("updateStripeAccount", "Stripe account", account_id)),
        }
        let mut updated = account.clone();
        updated.id = account_id.to_string();
        updated.owner = self.caller.clone();
        data.stripe_accounts.insert(account_id.to_string(), updated);
        Ok(())
    }

    async fn delete_stripe_account(&self, account_id: &str) -> ReelResult<()> {
        self.enter_as_caller("deleteStripeAccount").await?;
        let mut data = self.store.data();
        match data.stripe_accounts.get(account_id) {
            Some(existing) if existing.owner == self.caller => {
                data.stripe_accounts.remove(account_id);
                data.connections
                    .retain(|_, connection| connection.stripe_account_id != account_id);
                Ok(())
            }
            Some(_) => Err(RemoteError::rejected("deleteStripeAccount", "Unauthorized: not the owner").into()),
            None => Err(not_found("deleteStripeAccount", "Stripe account", account_id)),
        }
    }

    async fn get_channel_stripe_connection(
        &self,
        channel_id: &str,
    ) -> ReelResult<Option<ChannelStripeConnection>> {
        self.enter("getChannelStripeConnection").await?;
        Ok(self.store.data().connections.get(channel_id).cloned())
    }

    async fn connect_channel_to_stripe_account(
        &self,
        connection: &ChannelStripeConnection,
    ) -> ReelResult<()> {
        self.enter_as_caller("connectChannelToStripeAccount").await?;
        let mut data = self.store.data();
        self.require_owner("connectChannelToStripeAccount", &data, &connection.channel_id)?;
        if !data.stripe_accounts.contains_key(&connection.stripe_account_id) {
            return Err(not_found(
                "connectChannelToStripeAccount",
                "Stripe account",
                &connection.stripe_account_id,
            ));
        }
        data.connections
            .insert(connection.channel_id.clone(), connection.clone());
        Ok(())
    }

    async fn is_stripe_configured(&self) -> ReelResult<bool> {
        self.enter("isStripeConfigured").await?;
        Ok(self.store.data().stripe_config.is_some())
    }

    async fn set_stripe_configuration(&self, config: &StripeConfiguration) -> ReelResult<()> {
        self.enter_as_caller("setStripeConfiguration").await?;
        let mut data = self.store.data();
        if data.roles.get(&self.caller) != Some(&UserRole::Admin) {
            return Err(RemoteError::rejected("setStripeConfiguration", "Unauthorized: only admins").into());
        }
        data.stripe_config = Some(config.clone());
        Ok(())
    }

    async fn create_checkout_session(
        &self,
        items: &[ShoppingItem],
        _success_url: &str,
        _cancel_url: &str,
    ) -> ReelResult<String> {
        self.enter_as_caller("createCheckoutSession").await?;
        let mut data = self.store.data();
        if data.stripe_config.is_none() {
            return Err(RemoteError::rejected("createCheckoutSession", "Stripe needs to be first configured").into());
        }
        data.next_session += 1;
        let session_id = format!("cs_mock_{}", data.next_session);
        let total: u64 = items
            .iter()
            .map(|item| item.price_in_cents * item.quantity)
            .sum();
        data.checkout_sessions.insert(
            session_id.clone(),
            StripeSessionStatus::Completed {
                response: format!("{{\"amount_total\":{total}}}"),
                user_principal: Some(self.caller.as_str().to_string()),
            },
        );
        Ok(format!("{CHECKOUT_URL_PREFIX}{session_id}"))
    }

    async fn get_stripe_session_status(&self, session_id: &str) -> ReelResult<StripeSessionStatus> {
        self.enter("getStripeSessionStatus").await?;
        self.store
            .data()
            .checkout_sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| not_found("getStripeSessionStatus", "Checkout session", session_id))
    }
}

// ============================================================================
// MOCK FACTORY AND IDENTITY PROVIDER
// ============================================================================

/// [`BackendFactory`] producing [`MockBackend`]s over one [`MockStore`].
#[derive(Debug, Default)]
pub struct MockBackendFactory {
    store: MockStore,
    builds: AtomicUsize,
    built_for: Mutex<Vec<Principal>>,
    gate: Mutex<Option<Gate>>,
    failure: Mutex<Option<String>>,
}

impl MockBackendFactory {
    pub fn new(store: MockStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    pub fn store(&self) -> &MockStore {
        &self.store
    }

    /// Builds started so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Principals of the builds started so far, in order.
    pub fn built_for(&self) -> Vec<Principal> {
        lock(&self.built_for).clone()
    }

    /// Hold subsequent builds until the returned gate opens.
    pub fn hold(&self) -> Gate {
        let gate = Gate::new();
        *lock(&self.gate) = Some(gate.clone());
        gate
    }

    pub fn release(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.open();
        }
    }

    pub fn fail_builds(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    pub fn succeed_builds(&self) {
        *lock(&self.failure) = None;
    }
}

#[async_trait]
impl BackendFactory for MockBackendFactory {
    async fn build(&self, identity: Option<&Identity>) -> ReelResult<Arc<dyn Backend>> {
        let principal = identity
            .map(|identity| identity.principal.clone())
            .unwrap_or_else(Principal::anonymous);
        self.builds.fetch_add(1, Ordering::SeqCst);
        lock(&self.built_for).push(principal.clone());

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(message) = lock(&self.failure).clone() {
            return Err(RemoteError::Transport {
                operation: "buildActor".to_string(),
                reason: message,
            }
            .into());
        }
        Ok(Arc::new(self.store.backend_for(principal)))
    }
}

/// Scripted result of one interactive login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginScript {
    Succeed(Identity),
    Fail(String),
    Cancel,
}

/// [`IdentityProvider`] that plays back scripted login results.
///
/// With an empty script every login succeeds as [`MockIdentityProvider::DEFAULT_PRINCIPAL`].
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    script: Mutex<VecDeque<LoginScript>>,
    gate: Mutex<Option<Gate>>,
    reject_restore: Mutex<bool>,
    logins: AtomicUsize,
}

impl MockIdentityProvider {
    pub const DEFAULT_PRINCIPAL: &'static str = "mock-user";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: LoginScript) {
        lock(&self.script).push_back(step);
    }

    pub fn succeed_as(&self, principal: &str) {
        self.push(LoginScript::Succeed(Identity::new(Principal::from_text(principal))));
    }

    pub fn fail_next(&self, reason: impl Into<String>) {
        self.push(LoginScript::Fail(reason.into()));
    }

    pub fn cancel_next(&self) {
        self.push(LoginScript::Cancel);
    }

    /// Hold subsequent logins until the returned gate opens.
    pub fn hold(&self) -> Gate {
        let gate = Gate::new();
        *lock(&self.gate) = Some(gate.clone());
        gate
    }

    /// Treat every stored identity as unusable at startup.
    pub fn reject_restores(&self) {
        *lock(&self.reject_restore) = true;
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn authenticate(&self) -> Result<Identity, SessionError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let step = lock(&self.script).pop_front();
        match step {
            Some(LoginScript::Succeed(identity)) => Ok(identity),
            Some(LoginScript::Fail(reason)) => Err(SessionError::LoginFailed { reason }),
            Some(LoginScript::Cancel) => Err(SessionError::LoginCancelled),
            None => Ok(Identity::new(Principal::from_text(Self::DEFAULT_PRINCIPAL))),
        }
    }

    async fn restore(&self, stored: Identity) -> Result<Option<Identity>, SessionError> {
        if *lock(&self.reject_restore) {
            return Ok(None);
        }
        Ok(Some(stored))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Reelhouse domain records.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_principal() -> impl Strategy<Value = Principal> {
        "[a-z0-9]{5}-[a-z0-9]{5}".prop_map(Principal::from_text)
    }

    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        arb_principal().prop_map(Identity::new)
    }

    /// A present identity, the anonymous identity, or none.
    pub fn arb_maybe_identity() -> impl Strategy<Value = Option<Identity>> {
        prop_oneof![
            Just(None),
            Just(Some(Identity::anonymous())),
            arb_identity().prop_map(Some),
        ]
    }

    pub fn arb_category() -> impl Strategy<Value = Category> {
        proptest::sample::select(Category::ALL.to_vec())
    }

    pub fn arb_id(prefix: &'static str) -> impl Strategy<Value = String> {
        "[a-z0-9]{8}".prop_map(move |suffix| format!("{prefix}_{suffix}"))
    }

    pub fn arb_video(channel_id: String) -> impl Strategy<Value = VideoMetadata> {
        (
            arb_id("video"),
            "[A-Za-z ]{1,40}",
            arb_category(),
            any::<bool>(),
            0u64..10_000,
        )
            .prop_map(move |(id, title, category, is_private, view_count)| {
                let mut video = fixtures::video(&id, &channel_id);
                video.title = title;
                video.category = category;
                video.is_private = is_private;
                video.view_count = view_count;
                video
            })
    }

    pub fn arb_tier(channel_id: String) -> impl Strategy<Value = MembershipTier> {
        (arb_id("tier"), 1u64..5, 100u64..10_000).prop_map(move |(id, level, price)| {
            let mut tier = fixtures::tier(&id, &channel_id, level);
            tier.price_usd = price;
            tier
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made records for common scenarios.

    use super::*;

    pub fn principal(name: &str) -> Principal {
        Principal::from_text(name)
    }

    pub fn identity(name: &str) -> Identity {
        Identity::new(principal(name))
    }

    pub fn channel(id: &str, owner: &str) -> Channel {
        Channel {
            id: id.to_string(),
            principal: principal(owner),
            name: format!("Channel {id}"),
            profile: String::new(),
        }
    }

    pub fn video(id: &str, channel_id: &str) -> VideoMetadata {
        VideoMetadata {
            id: id.to_string(),
            title: format!("Video {id}"),
            description: String::new(),
            channel_id: channel_id.to_string(),
            category: Category::Education,
            video_url: format!("https://cdn.reelhouse.video/{id}.mp4"),
            thumbnail_url: format!("https://cdn.reelhouse.video/{id}.jpg"),
            upload_date: 1_700_000_000_000_000_000,
            view_count: 0,
            like_count: 0,
            is_private: false,
            required_tier_level: None,
        }
    }

    pub fn comment(id: &str, video_id: &str, content: &str) -> Comment {
        Comment {
            id: id.to_string(),
            video_id: video_id.to_string(),
            author: Principal::anonymous(),
            content: content.to_string(),
            timestamp: 1_700_000_000_000_000_000,
        }
    }

    pub fn tier(id: &str, channel_id: &str, level: u64) -> MembershipTier {
        MembershipTier {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            name: format!("Tier {level}"),
            description: String::new(),
            tier_level: level,
            price_usd: 500 * level,
        }
    }

    pub fn course(id: &str, channel_id: &str, video_ids: &[&str]) -> Course {
        Course {
            id: id.to_string(),
            title: format!("Course {id}"),
            description: String::new(),
            channel_id: channel_id.to_string(),
            video_ids: video_ids.iter().map(|v| v.to_string()).collect(),
            is_visible: true,
            course_image: None,
            price_usd: None,
            required_tier_level: None,
        }
    }

    pub fn playlist(id: &str, creator: &str, video_ids: &[&str]) -> Playlist {
        Playlist {
            id: id.to_string(),
            title: format!("Playlist {id}"),
            description: String::new(),
            creator: principal(creator),
            visibility: PlaylistVisibility::PublicVisibility,
            video_ids: video_ids.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn donation(id: &str, channel_id: &str, amount_usd: u64, timestamp: u64) -> Donation {
        Donation {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            donor: Principal::anonymous(),
            amount_usd,
            message: None,
            timestamp,
        }
    }

    pub fn stripe_account(id: &str, owner: &str) -> StripeAccount {
        StripeAccount {
            id: id.to_string(),
            owner: principal(owner),
            account_name: format!("Account {id}"),
            secret_key: "sk_test_mock".to_string(),
            connect_id: None,
            payout_settings: None,
        }
    }

    pub fn shopping_item(name: &str, quantity: u64, price_in_cents: u64) -> ShoppingItem {
        ShoppingItem {
            product_name: name.to_string(),
            product_description: String::new(),
            currency: "usd".to_string(),
            quantity,
            price_in_cents,
        }
    }

    pub fn stripe_configuration() -> StripeConfiguration {
        StripeConfiguration {
            secret_key: "sk_test_mock".to_string(),
            allowed_countries: vec!["US".to_string()],
        }
    }

    /// Store with two channels owned by `alice` and `bob`, one video each.
    pub fn two_channel_store() -> MockStore {
        let store = MockStore::new();
        store.insert_channel(channel("chan-a", "alice"));
        store.insert_channel(channel("chan-b", "bob"));
        store.insert_video(video("vid-a1", "chan-a"));
        store.insert_video(video("vid-b1", "chan-b"));
        store
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Reelhouse error variants.

    use super::*;

    #[track_caller]
    pub fn assert_rejected<T: std::fmt::Debug>(result: &ReelResult<T>, operation: &str) {
        match result {
            Err(ReelError::Remote(RemoteError::Rejected { operation: op, .. })) => {
                assert_eq!(op, operation, "Rejection from the wrong operation");
            }
            other => panic!("Expected {operation} rejection, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &ReelResult<T>) {
        match result {
            Err(ReelError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_handle_not_ready<T: std::fmt::Debug>(result: &ReelResult<T>) {
        match result {
            Err(ReelError::Session(SessionError::HandleNotReady)) => {}
            other => panic!("Expected HandleNotReady, got: {other:?}"),
        }
    }
}
