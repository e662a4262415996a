//! Remote call surface of the backend service.
//!
//! One method per backend operation. Implementations are bound to a single
//! identity at construction time; the [`ServiceHandle`](crate::ServiceHandle)
//! replaces them when the identity changes.

use async_trait::async_trait;
use reelhouse_core::{
    Category, Channel, ChannelStripeConnection, Comment, Course, Donation, FullVideo, Identity,
    MembershipTier, Playlist, Principal, ReelResult, ShoppingItem, StripeAccount,
    StripeConfiguration, StripeSessionStatus, Subscription, UserProfile, UserRole, VideoMetadata,
};
use std::sync::Arc;

/// Typed client for the backend's named operations.
#[async_trait]
pub trait Backend: Send + Sync {
    // ------------------------------------------------------------------
    // Profiles and roles
    // ------------------------------------------------------------------

    async fn get_caller_user_profile(&self) -> ReelResult<Option<UserProfile>>;

    async fn get_user_profile(&self, user: &Principal) -> ReelResult<Option<UserProfile>>;

    async fn save_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()>;

    async fn update_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()>;

    async fn get_caller_user_role(&self) -> ReelResult<UserRole>;

    async fn is_caller_admin(&self) -> ReelResult<bool>;

    async fn assign_caller_user_role(&self, user: &Principal, role: UserRole) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Videos
    // ------------------------------------------------------------------

    async fn get_video(&self, video_id: &str) -> ReelResult<Option<VideoMetadata>>;

    /// Video together with its owning channel.
    async fn get_full_video_metadata(&self, video_id: &str) -> ReelResult<Option<FullVideo>>;

    async fn get_videos_by_category(&self, category: Category) -> ReelResult<Vec<VideoMetadata>>;

    async fn search_videos(&self, term: &str) -> ReelResult<Vec<VideoMetadata>>;

    async fn upload_video(&self, metadata: &VideoMetadata) -> ReelResult<()>;

    async fn update_video(&self, video_id: &str, metadata: &VideoMetadata) -> ReelResult<()>;

    async fn toggle_video_privacy(&self, video_id: &str) -> ReelResult<()>;

    async fn delete_video(&self, video_id: &str) -> ReelResult<()>;

    async fn like_video(&self, video_id: &str) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    async fn get_comments(&self, video_id: &str) -> ReelResult<Vec<Comment>>;

    async fn add_comment(&self, comment: &Comment) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Channels and following
    // ------------------------------------------------------------------

    async fn get_channel(&self, channel_id: &str) -> ReelResult<Option<Channel>>;

    /// Channels owned by the caller.
    async fn get_user_channels(&self) -> ReelResult<Vec<Channel>>;

    async fn get_channel_videos(&self, channel_id: &str) -> ReelResult<Vec<VideoMetadata>>;

    async fn create_channel(&self, channel: &Channel) -> ReelResult<()>;

    async fn update_channel(&self, channel_id: &str, name: &str, profile: &str) -> ReelResult<()>;

    async fn is_following_channel(&self, channel_id: &str) -> ReelResult<bool>;

    async fn get_followed_channels(&self) -> ReelResult<Vec<String>>;

    async fn get_channel_followers(&self, channel_id: &str) -> ReelResult<Vec<Principal>>;

    async fn follow_channel(&self, channel_id: &str) -> ReelResult<()>;

    async fn unfollow_channel(&self, channel_id: &str) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Membership tiers and subscriptions
    // ------------------------------------------------------------------

    async fn get_channel_membership_tiers(&self, channel_id: &str) -> ReelResult<Vec<MembershipTier>>;

    /// Tier level the caller holds on a channel, if subscribed.
    async fn get_user_subscription_tier_level(&self, channel_id: &str) -> ReelResult<Option<u64>>;

    async fn has_active_subscription(&self, channel_id: &str) -> ReelResult<bool>;

    async fn create_membership_tier(&self, tier: &MembershipTier) -> ReelResult<()>;

    async fn update_membership_tier(&self, tier_id: &str, tier: &MembershipTier) -> ReelResult<()>;

    async fn delete_membership_tier(&self, tier_id: &str) -> ReelResult<()>;

    async fn create_subscription(&self, subscription: &Subscription) -> ReelResult<()>;

    async fn cancel_subscription(&self, subscription_id: &str) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Courses
    // ------------------------------------------------------------------

    async fn get_channel_courses(&self, channel_id: &str) -> ReelResult<Vec<Course>>;

    async fn get_course(&self, course_id: &str) -> ReelResult<Option<Course>>;

    async fn get_personalized_courses(&self) -> ReelResult<Vec<Course>>;

    async fn create_course(&self, course: &Course) -> ReelResult<()>;

    async fn update_course(&self, course_id: &str, course: &Course) -> ReelResult<()>;

    async fn delete_course(&self, course_id: &str) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Playlists
    // ------------------------------------------------------------------

    async fn get_user_playlists(&self) -> ReelResult<Vec<Playlist>>;

    async fn get_public_playlists(&self) -> ReelResult<Vec<Playlist>>;

    async fn get_playlist(&self, playlist_id: &str) -> ReelResult<Option<Playlist>>;

    async fn create_playlist(&self, playlist: &Playlist) -> ReelResult<()>;

    async fn update_playlist(&self, playlist_id: &str, playlist: &Playlist) -> ReelResult<()>;

    async fn delete_playlist(&self, playlist_id: &str) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Donations
    // ------------------------------------------------------------------

    async fn get_channel_donations(&self, channel_id: &str) -> ReelResult<Vec<Donation>>;

    async fn get_user_donation_history(&self) -> ReelResult<Vec<Donation>>;

    async fn record_donation(&self, donation: &Donation) -> ReelResult<()>;

    // ------------------------------------------------------------------
    // Stripe
    // ------------------------------------------------------------------

    async fn get_user_stripe_accounts(&self) -> ReelResult<Vec<StripeAccount>>;

    async fn get_stripe_account(&self, account_id: &str) -> ReelResult<Option<StripeAccount>>;

    async fn create_stripe_account(&self, account: &StripeAccount) -> ReelResult<()>;

    async fn update_stripe_account(&self, account_id: &str, account: &StripeAccount) -> ReelResult<()>;

    async fn delete_stripe_account(&self, account_id: &str) -> ReelResult<()>;

    async fn get_channel_stripe_connection(
        &self,
        channel_id: &str,
    ) -> ReelResult<Option<ChannelStripeConnection>>;

    async fn connect_channel_to_stripe_account(
        &self,
        connection: &ChannelStripeConnection,
    ) -> ReelResult<()>;

    async fn is_stripe_configured(&self) -> ReelResult<bool>;

    async fn set_stripe_configuration(&self, config: &StripeConfiguration) -> ReelResult<()>;

    /// Start a checkout session and return its redirect URL.
    async fn create_checkout_session(
        &self,
        items: &[ShoppingItem],
        success_url: &str,
        cancel_url: &str,
    ) -> ReelResult<String>;

    async fn get_stripe_session_status(&self, session_id: &str) -> ReelResult<StripeSessionStatus>;
}

/// Builds a [`Backend`] bound to an identity.
///
/// `None` and the anonymous identity both produce an anonymous backend.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(&self, identity: Option<&Identity>) -> ReelResult<Arc<dyn Backend>>;
}
