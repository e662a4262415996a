//! HTTP gateway implementation of [`Backend`].
//!
//! Every operation is a `POST {gateway_url}/api/v1/call/{operation}` whose
//! body is the JSON array of its arguments. The caller's principal travels in
//! the `X-Principal` header; anonymous calls omit it.

use crate::backend::{Backend, BackendFactory};
use crate::config::ClientConfig;
use async_trait::async_trait;
use reelhouse_core::{
    Category, Channel, ChannelStripeConnection, Comment, ConfigError, Course, Donation, FullVideo,
    Identity, MembershipTier, Playlist, Principal, ReelResult, RemoteError, ShoppingItem,
    StripeAccount, StripeConfiguration, StripeSessionStatus, Subscription, UserProfile, UserRole,
    VideoMetadata,
};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying the caller's principal.
pub const PRINCIPAL_HEADER: &str = "x-principal";

/// Header carrying a per-call request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const CALL_PATH: &str = "/api/v1/call";

/// Arguments of a zero-argument operation; serializes as `[]`.
const NO_ARGS: [(); 0] = [];

/// Backend reached through the HTTP gateway, bound to one principal.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    principal: Option<Principal>,
    api_key: Option<Arc<SecretString>>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("principal", &self.principal)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpBackend {
    /// The principal this backend calls as, `None` when anonymous.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<A, T>(&self, operation: &'static str, args: &A) -> ReelResult<T>
    where
        A: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}/{}", self.base_url, CALL_PATH, operation);
        let request_id = Uuid::now_v7();

        let mut request = self
            .client
            .post(url)
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .json(args);
        if let Some(principal) = &self.principal {
            request = request.header(PRINCIPAL_HEADER, principal.as_str());
        }
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        tracing::debug!(operation, %request_id, "Calling backend");

        let response = request.send().await.map_err(|e| RemoteError::Transport {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| RemoteError::Transport {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            let message = rejection_message(status, &String::from_utf8_lossy(&body));
            tracing::warn!(operation, %request_id, status = status.as_u16(), %message, "Backend rejected call");
            return Err(RemoteError::rejected(operation, message).into());
        }

        decode_body(operation, &body)
    }
}

/// Decode a success body. An empty body decodes as JSON `null`.
fn decode_body<T: DeserializeOwned>(operation: &str, body: &[u8]) -> ReelResult<T> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| {
        RemoteError::Decode {
            operation: operation.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Extract the human-readable message from an error response body.
///
/// Looks for a JSON `message` or `error` string first, then falls back to
/// the raw body, then to the status line.
fn rejection_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(message) = value.get(field).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_caller_user_profile(&self) -> ReelResult<Option<UserProfile>> {
        self.call("getCallerUserProfile", &NO_ARGS).await
    }

    async fn get_user_profile(&self, user: &Principal) -> ReelResult<Option<UserProfile>> {
        self.call("getUserProfile", &(user,)).await
    }

    async fn save_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()> {
        self.call("saveCallerUserProfile", &(profile,)).await
    }

    async fn update_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()> {
        self.call("updateCallerUserProfile", &(profile,)).await
    }

    async fn get_caller_user_role(&self) -> ReelResult<UserRole> {
        self.call("getCallerUserRole", &NO_ARGS).await
    }

    async fn is_caller_admin(&self) -> ReelResult<bool> {
        self.call("isCallerAdmin", &NO_ARGS).await
    }

    async fn assign_caller_user_role(&self, user: &Principal, role: UserRole) -> ReelResult<()> {
        self.call("assignCallerUserRole", &(user, role)).await
    }

    async fn get_video(&self, video_id: &str) -> ReelResult<Option<VideoMetadata>> {
        self.call("getVideo", &(video_id,)).await
    }

    async fn get_full_video_metadata(&self, video_id: &str) -> ReelResult<Option<FullVideo>> {
        self.call("getFullVideoMetadata", &(video_id,)).await
    }

    async fn get_videos_by_category(&self, category: Category) -> ReelResult<Vec<VideoMetadata>> {
        self.call("getVideosByCategory", &(category,)).await
    }

    async fn search_videos(&self, term: &str) -> ReelResult<Vec<VideoMetadata>> {
        self.call("searchVideos", &(term,)).await
    }

    async fn upload_video(&self, metadata: &VideoMetadata) -> ReelResult<()> {
        self.call("uploadVideo", &(metadata,)).await
    }

    async fn update_video(&self, video_id: &str, metadata: &VideoMetadata) -> ReelResult<()> {
        self.call("updateVideo", &(video_id, metadata)).await
    }

    async fn toggle_video_privacy(&self, video_id: &str) -> ReelResult<()> {
        self.call("toggleVideoPrivacy", &(video_id,)).await
    }

    async fn delete_video(&self, video_id: &str) -> ReelResult<()> {
        self.call("deleteVideo", &(video_id,)).await
    }

    async fn like_video(&self, video_id: &str) -> ReelResult<()> {
        self.call("likeVideo", &(video_id,)).await
    }

    async fn get_comments(&self, video_id: &str) -> ReelResult<Vec<Comment>> {
        self.call("getComments", &(video_id,)).await
    }

    async fn add_comment(&self, comment: &Comment) -> ReelResult<()> {
        self.call("addComment", &(comment,)).await
    }

    async fn get_channel(&self, channel_id: &str) -> ReelResult<Option<Channel>> {
        self.call("getChannel", &(channel_id,)).await
    }

    async fn get_user_channels(&self) -> ReelResult<Vec<Channel>> {
        self.call("getUserChannels", &NO_ARGS).await
    }

    async fn get_channel_videos(&self, channel_id: &str) -> ReelResult<Vec<VideoMetadata>> {
        self.call("getChannelVideos", &(channel_id,)).await
    }

    async fn create_channel(&self, channel: &Channel) -> ReelResult<()> {
        self.call("createChannel", &(channel,)).await
    }

    async fn update_channel(&self, channel_id: &str, name: &str, profile: &str) -> ReelResult<()> {
        self.call("updateChannel", &(channel_id, name, profile)).await
    }

    async fn is_following_channel(&self, channel_id: &str) -> ReelResult<bool> {
        self.call("isFollowingChannel", &(channel_id,)).await
    }

    async fn get_followed_channels(&self) -> ReelResult<Vec<String>> {
        self.call("getFollowedChannels", &NO_ARGS).await
    }

    async fn get_channel_followers(&self, channel_id: &str) -> ReelResult<Vec<Principal>> {
        self.call("getChannelFollowers", &(channel_id,)).await
    }

    async fn follow_channel(&self, channel_id: &str) -> ReelResult<()> {
        self.call("followChannel", &(channel_id,)).await
    }

    async fn unfollow_channel(&self, channel_id: &str) -> ReelResult<()> {
        self.call("unfollowChannel", &(channel_id,)).await
    }

    async fn get_channel_membership_tiers(&self, channel_id: &str) -> ReelResult<Vec<MembershipTier>> {
        self.call("getChannelMembershipTiers", &(channel_id,)).await
    }

    async fn get_user_subscription_tier_level(&self, channel_id: &str) -> ReelResult<Option<u64>> {
        self.call("getUserSubscriptionTierLevel", &(channel_id,)).await
    }

    async fn has_active_subscription(&self, channel_id: &str) -> ReelResult<bool> {
        self.call("hasActiveSubscription", &(channel_id,)).await
    }

    async fn create_membership_tier(&self, tier: &MembershipTier) -> ReelResult<()> {
        self.call("createMembershipTier", &(tier,)).await
    }

    async fn update_membership_tier(&self, tier_id: &str, tier: &MembershipTier) -> ReelResult<()> {
        self.call("updateMembershipTier", &(tier_id, tier)).await
    }

    async fn delete_membership_tier(&self, tier_id: &str) -> ReelResult<()> {
        self.call("deleteMembershipTier", &(tier_id,)).await
    }

    async fn create_subscription(&self, subscription: &Subscription) -> ReelResult<()> {
        self.call("createSubscription", &(subscription,)).await
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> ReelResult<()> {
        self.call("cancelSubscription", &(subscription_id,)).await
    }

    async fn get_channel_courses(&self, channel_id: &str) -> ReelResult<Vec<Course>> {
        self.call("getChannelCourses", &(channel_id,)).await
    }

    async fn get_course(&self, course_id: &str) -> ReelResult<Option<Course>> {
        self.call("getCourse", &(course_id,)).await
    }

    async fn get_personalized_courses(&self) -> ReelResult<Vec<Course>> {
        self.call("getPersonalizedCourses", &NO_ARGS).await
    }

    async fn create_course(&self, course: &Course) -> ReelResult<()> {
        self.call("createCourse", &(course,)).await
    }

    async fn update_course(&self, course_id: &str, course: &Course) -> ReelResult<()> {
        self.call("updateCourse", &(course_id, course)).await
    }

    async fn delete_course(&self, course_id: &str) -> ReelResult<()> {
        self.call("deleteCourse", &(course_id,)).await
    }

    async fn get_user_playlists(&self) -> ReelResult<Vec<Playlist>> {
        self.call("getUserPlaylists", &NO_ARGS).await
    }

    async fn get_public_playlists(&self) -> ReelResult<Vec<Playlist>> {
        self.call("getPublicPlaylists", &NO_ARGS).await
    }

    async fn get_playlist(&self, playlist_id: &str) -> ReelResult<Option<Playlist>> {
        self.call("getPlaylist", &(playlist_id,)).await
    }

    async fn create_playlist(&self, playlist: &Playlist) -> ReelResult<()> {
        self.call("createPlaylist", &(playlist,)).await
    }

    async fn update_playlist(&self, playlist_id: &str, playlist: &Playlist) -> ReelResult<()> {
        self.call("updatePlaylist", &(playlist_id, playlist)).await
    }

    async fn delete_playlist(&self, playlist_id: &str) -> ReelResult<()> {
        self.call("deletePlaylist", &(playlist_id,)).await
    }

    async fn get_channel_donations(&self, channel_id: &str) -> ReelResult<Vec<Donation>> {
        self.call("getChannelDonations", &(channel_id,)).await
    }

    async fn get_user_donation_history(&self) -> ReelResult<Vec<Donation>> {
        self.call("getUserDonationHistory", &NO_ARGS).await
    }

    async fn record_donation(&self, donation: &Donation) -> ReelResult<()> {
        self.call("recordDonation", &(donation,)).await
    }

    async fn get_user_stripe_accounts(&self) -> ReelResult<Vec<StripeAccount>> {
        self.call("getUserStripeAccounts", &NO_ARGS).await
    }

    async fn get_stripe_account(&self, account_id: &str) -> ReelResult<Option<StripeAccount>> {
        self.call("getStripeAccount", &(account_id,)).await
    }

    async fn create_stripe_account(&self, account: &StripeAccount) -> ReelResult<()> {
        self.call("createStripeAccount", &(account,)).await
    }

    async fn update_stripe_account(&self, account_id: &str, account: &StripeAccount) -> ReelResult<()> {
        self.call("updateStripeAccount", &(account_id, account)).await
    }

    async fn delete_stripe_account(&self, account_id: &str) -> ReelResult<()> {
        self.call("deleteStripeAccount", &(account_id,)).await
    }

    async fn get_channel_stripe_connection(
        &self,
        channel_id: &str,
    ) -> ReelResult<Option<ChannelStripeConnection>> {
        self.call("getChannelStripeConnection", &(channel_id,)).await
    }

    async fn connect_channel_to_stripe_account(
        &self,
        connection: &ChannelStripeConnection,
    ) -> ReelResult<()> {
        self.call("connectChannelToStripeAccount", &(connection,)).await
    }

    async fn is_stripe_configured(&self) -> ReelResult<bool> {
        self.call("isStripeConfigured", &NO_ARGS).await
    }

    async fn set_stripe_configuration(&self, config: &StripeConfiguration) -> ReelResult<()> {
        self.call("setStripeConfiguration", &(config,)).await
    }

    async fn create_checkout_session(
        &self,
        items: &[ShoppingItem],
        success_url: &str,
        cancel_url: &str,
    ) -> ReelResult<String> {
        self.call("createCheckoutSession", &(items, success_url, cancel_url))
            .await
    }

    async fn get_stripe_session_status(&self, session_id: &str) -> ReelResult<StripeSessionStatus> {
        self.call("getStripeSessionStatus", &(session_id,)).await
    }
}

/// Builds [`HttpBackend`]s that share one connection pool.
pub struct HttpBackendFactory {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<Arc<SecretString>>,
}

impl std::fmt::Debug for HttpBackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendFactory")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpBackendFactory {
    pub fn new(config: &ClientConfig) -> ReelResult<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "request_timeout_ms".to_string(),
                value: config.request_timeout_ms.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .as_ref()
                .map(|key| Arc::new(SecretString::new(key.clone().into()))),
        })
    }

    /// Build a backend for `identity` without going through the trait.
    pub fn bind(&self, identity: Option<&Identity>) -> HttpBackend {
        HttpBackend {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            principal: identity
                .filter(|identity| !identity.is_anonymous())
                .map(|identity| identity.principal.clone()),
            api_key: self.api_key.clone(),
        }
    }
}

#[async_trait]
impl BackendFactory for HttpBackendFactory {
    async fn build(&self, identity: Option<&Identity>) -> ReelResult<Arc<dyn Backend>> {
        let backend = self.bind(identity);
        tracing::debug!(
            base_url = %backend.base_url,
            principal = ?backend.principal,
            "Built HTTP backend"
        );
        Ok(Arc::new(backend))
    }
}
