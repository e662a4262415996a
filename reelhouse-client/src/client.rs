//! Typed reads and writes over the query cache.
//!
//! Every read is gated by explicit preconditions (handle ready, required
//! parameters present, caller logged in for caller-scoped resources) and
//! returns [`QueryOutcome::NotReady`] instead of issuing a speculative call.
//! Each read has a `watch_*` twin that registers an active subscriber.
//!
//! Every write performs exactly one remote call. On success it invalidates
//! what the [`InvalidationGraph`] declares for it and waits for subscribed
//! keys to refetch; on failure nothing is invalidated and nothing is retried.

use crate::backend::{Backend, BackendFactory};
use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::handle::ServiceHandle;
use crate::http::HttpBackendFactory;
use crate::identity::{DeviceKeyIdentityProvider, IdentityAdapter, IdentityProvider};
use crate::session::AuthSession;
use async_trait::async_trait;
use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use reelhouse_cache::{
    spawn_gc_task, GcConfig, InvalidationGraph, MutationKind, MutationScope, NotReady,
    Preconditions, QueryCache, QueryFetcher, QueryKey, QueryOutcome, QuerySubscription, Resource,
};
use reelhouse_core::{
    channel_analytics, Category, Channel, ChannelAnalytics, ChannelStripeConnection, Comment,
    Course, Donation, FullVideo, MembershipTier, PaymentKind, PaymentUrls, Playlist, Principal,
    ReelError, ReelResult, ShoppingItem, StripeAccount, StripeConfiguration, StripeSessionStatus,
    Subscription, UserProfile, UserRole, ValidationError, VideoMetadata,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Outcome of a subscribing read.
#[derive(Debug)]
pub enum WatchOutcome<T> {
    NotReady(NotReady),
    Active(QuerySubscription<T>),
}

impl<T> WatchOutcome<T> {
    pub fn is_active(&self) -> bool {
        matches!(self, WatchOutcome::Active(_))
    }

    pub fn not_ready_reason(&self) -> Option<NotReady> {
        match self {
            WatchOutcome::NotReady(reason) => Some(*reason),
            WatchOutcome::Active(_) => None,
        }
    }

    pub fn into_subscription(self) -> Option<QuerySubscription<T>> {
        match self {
            WatchOutcome::Active(subscription) => Some(subscription),
            WatchOutcome::NotReady(_) => None,
        }
    }
}

type BackendCall<T> = Arc<dyn Fn(Arc<dyn Backend>) -> BoxFuture<'static, ReelResult<T>> + Send + Sync>;

/// Fetcher that resolves the backend at fetch time, so refetches after an
/// identity change never use the previous identity's backend.
struct BackendFetcher<T> {
    session: AuthSession,
    call: BackendCall<T>,
}

#[async_trait]
impl<T> QueryFetcher for BackendFetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    async fn fetch(&self) -> ReelResult<T> {
        let backend = self.session.backend()?;
        (self.call)(backend).await
    }
}

type Planned<T> = Result<(QueryKey, BackendFetcher<T>), NotReady>;

fn require_text(field: &str, value: &str) -> ReelResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredParameterMissing {
            parameter: field.to_string(),
        }
        .into());
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> ReelResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(())
}

#[derive(Clone)]
pub struct ReelClient {
    session: AuthSession,
    cache: QueryCache,
    graph: Arc<InvalidationGraph>,
    gc: GcConfig,
}

impl std::fmt::Debug for ReelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReelClient")
            .field("session", &self.session)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ReelClient {
    pub fn new(session: AuthSession, graph: InvalidationGraph) -> Self {
        let cache = session.cache().clone();
        Self {
            session,
            cache,
            graph: Arc::new(graph),
            gc: GcConfig::default(),
        }
    }

    /// Assemble a client from its collaborators with the standard graph.
    pub fn assemble(
        factory: Arc<dyn BackendFactory>,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn CredentialStore>,
        cache: QueryCache,
    ) -> Self {
        let adapter = IdentityAdapter::new(provider, store);
        let handle = ServiceHandle::new(factory);
        let session = AuthSession::new(adapter, handle, cache);
        Self::new(session, InvalidationGraph::standard())
    }

    /// Client talking to the configured gateway, with a file credential
    /// store and device-key logins. Call [`AuthSession::initialize`] next.
    pub fn from_config(config: &ClientConfig) -> ReelResult<Self> {
        config.validate()?;
        let factory = Arc::new(HttpBackendFactory::new(config)?);
        let provider = Arc::new(DeviceKeyIdentityProvider::new(config.session_ttl()));
        let store = Arc::new(FileCredentialStore::new(config.credential_path.clone()));
        let cache = QueryCache::new(config.policy_table()?);
        let mut client = Self::assemble(factory, provider, store, cache);
        client.gc = config.gc_config();
        Ok(client)
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn graph(&self) -> &InvalidationGraph {
        &self.graph
    }

    /// Run cache garbage collection until `shutdown_rx` flips to `true`.
    pub fn spawn_gc(&self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<u64> {
        spawn_gc_task(self.cache.clone(), self.gc.clone(), shutdown_rx)
    }

    // ========================================================================
    // READ PLUMBING
    // ========================================================================

    fn query<T, F>(
        &self,
        resource: Resource,
        params: &[(&'static str, Option<&str>)],
        call: F,
    ) -> Planned<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Arc<dyn Backend>) -> BoxFuture<'static, ReelResult<T>> + Send + Sync + 'static,
    {
        let mut preconditions = Preconditions::new(self.session.is_backend_ready());
        for &(name, value) in params {
            preconditions = preconditions.param(name, value);
        }
        if resource.is_caller_scoped() {
            preconditions = preconditions.authenticated(self.session.is_authenticated());
        }
        preconditions.check()?;

        let key = QueryKey::new(
            resource,
            params.iter().map(|(_, value)| value.unwrap_or_default()),
        );
        let fetcher = BackendFetcher {
            session: self.session.clone(),
            call: Arc::new(call),
        };
        Ok((key, fetcher))
    }

    async fn read<T>(&self, planned: Planned<T>) -> ReelResult<QueryOutcome<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        match planned {
            Ok((key, fetcher)) => Ok(QueryOutcome::Ready(self.cache.read(key, fetcher).await?)),
            Err(reason) => {
                tracing::trace!(%reason, "Read disabled");
                Ok(QueryOutcome::NotReady(reason))
            }
        }
    }

    fn watch<T>(&self, planned: Planned<T>) -> ReelResult<WatchOutcome<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        match planned {
            Ok((key, fetcher)) => Ok(WatchOutcome::Active(self.cache.subscribe(key, fetcher)?)),
            Err(reason) => Ok(WatchOutcome::NotReady(reason)),
        }
    }

    // ========================================================================
    // WRITE PLUMBING
    // ========================================================================

    async fn write<T, F, Fut>(&self, kind: MutationKind, scope: MutationScope, call: F) -> ReelResult<T>
    where
        F: FnOnce(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = ReelResult<T>>,
    {
        let backend = self.session.backend()?;
        let value = match call(backend).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(mutation = %kind, error = %e, "Write failed");
                return Err(e);
            }
        };

        let targets = self.graph.resolve(kind, &scope);
        match self.cache.invalidate(&targets).await {
            Ok(report) => tracing::debug!(
                mutation = %kind,
                marked_stale = report.marked_stale,
                refetched = report.refetched,
                refetch_failures = report.refetch_failures,
                "Write succeeded"
            ),
            Err(e) => tracing::error!(mutation = %kind, error = %e, "Invalidation after write failed"),
        }
        Ok(value)
    }

    // ========================================================================
    // PROFILES AND ROLES
    // ========================================================================

    fn caller_profile_query(&self) -> Planned<Option<UserProfile>> {
        self.query(Resource::CurrentUserProfile, &[], |backend| {
            async move { backend.get_caller_user_profile().await }.boxed()
        })
    }

    pub async fn get_caller_user_profile(&self) -> ReelResult<QueryOutcome<Option<UserProfile>>> {
        self.read(self.caller_profile_query()).await
    }

    pub fn watch_caller_user_profile(&self) -> ReelResult<WatchOutcome<Option<UserProfile>>> {
        self.watch(self.caller_profile_query())
    }

    fn user_profile_query(&self, user: Option<&Principal>) -> Planned<Option<UserProfile>> {
        let principal = user.cloned();
        self.query(
            Resource::UserProfile,
            &[("principal", user.map(Principal::as_str))],
            move |backend| {
                let principal = principal.clone();
                async move {
                    match principal {
                        Some(principal) => backend.get_user_profile(&principal).await,
                        None => Ok(None),
                    }
                }
                .boxed()
            },
        )
    }

    pub async fn get_user_profile(
        &self,
        user: Option<&Principal>,
    ) -> ReelResult<QueryOutcome<Option<UserProfile>>> {
        self.read(self.user_profile_query(user)).await
    }

    pub fn watch_user_profile(
        &self,
        user: Option<&Principal>,
    ) -> ReelResult<WatchOutcome<Option<UserProfile>>> {
        self.watch(self.user_profile_query(user))
    }

    fn caller_role_query(&self) -> Planned<UserRole> {
        self.query(Resource::CallerUserRole, &[], |backend| {
            async move { backend.get_caller_user_role().await }.boxed()
        })
    }

    pub async fn get_caller_user_role(&self) -> ReelResult<QueryOutcome<UserRole>> {
        self.read(self.caller_role_query()).await
    }

    pub fn watch_caller_user_role(&self) -> ReelResult<WatchOutcome<UserRole>> {
        self.watch(self.caller_role_query())
    }

    fn is_admin_query(&self) -> Planned<bool> {
        self.query(Resource::IsCallerAdmin, &[], |backend| {
            async move { backend.is_caller_admin().await }.boxed()
        })
    }

    pub async fn is_caller_admin(&self) -> ReelResult<QueryOutcome<bool>> {
        self.read(self.is_admin_query()).await
    }

    pub fn watch_is_caller_admin(&self) -> ReelResult<WatchOutcome<bool>> {
        self.watch(self.is_admin_query())
    }

    pub async fn save_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()> {
        require_text("name", &profile.name)?;
        self.write(MutationKind::SaveCallerUserProfile, MutationScope::new(), |backend| async move {
            backend.save_caller_user_profile(profile).await
        })
        .await
    }

    pub async fn update_caller_user_profile(&self, profile: &UserProfile) -> ReelResult<()> {
        require_text("name", &profile.name)?;
        self.write(MutationKind::UpdateCallerUserProfile, MutationScope::new(), |backend| async move {
            backend.update_caller_user_profile(profile).await
        })
        .await
    }

    pub async fn assign_caller_user_role(&self, user: &Principal, role: UserRole) -> ReelResult<()> {
        self.write(MutationKind::AssignCallerUserRole, MutationScope::new(), |backend| async move {
            backend.assign_caller_user_role(user, role).await
        })
        .await
    }

    // ========================================================================
    // VIDEOS
    // ========================================================================

    fn all_videos_query(&self) -> Planned<Vec<VideoMetadata>> {
        self.query(Resource::AllVideos, &[], |backend| {
            async move {
                let lists = try_join_all(
                    Category::ALL
                        .iter()
                        .map(|category| backend.get_videos_by_category(*category)),
                )
                .await?;
                Ok::<_, ReelError>(lists.into_iter().flatten().collect())
            }
            .boxed()
        })
    }

    /// Every video, gathered from all categories concurrently.
    pub async fn get_all_videos(&self) -> ReelResult<QueryOutcome<Vec<VideoMetadata>>> {
        self.read(self.all_videos_query()).await
    }

    pub fn watch_all_videos(&self) -> ReelResult<WatchOutcome<Vec<VideoMetadata>>> {
        self.watch(self.all_videos_query())
    }

    fn video_query(&self, video_id: Option<&str>) -> Planned<Option<VideoMetadata>> {
        let id = video_id.unwrap_or_default().to_string();
        self.query(Resource::Video, &[("video_id", video_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_video(&id).await }.boxed()
        })
    }

    pub async fn get_video(&self, video_id: Option<&str>) -> ReelResult<QueryOutcome<Option<VideoMetadata>>> {
        self.read(self.video_query(video_id)).await
    }

    pub fn watch_video(&self, video_id: Option<&str>) -> ReelResult<WatchOutcome<Option<VideoMetadata>>> {
        self.watch(self.video_query(video_id))
    }

    fn full_video_query(&self, video_id: Option<&str>) -> Planned<Option<FullVideo>> {
        let id = video_id.unwrap_or_default().to_string();
        self.query(Resource::FullVideo, &[("video_id", video_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_full_video_metadata(&id).await }.boxed()
        })
    }

    pub async fn get_full_video(&self, video_id: Option<&str>) -> ReelResult<QueryOutcome<Option<FullVideo>>> {
        self.read(self.full_video_query(video_id)).await
    }

    pub fn watch_full_video(&self, video_id: Option<&str>) -> ReelResult<WatchOutcome<Option<FullVideo>>> {
        self.watch(self.full_video_query(video_id))
    }

    fn category_query(&self, category: Category) -> Planned<Vec<VideoMetadata>> {
        self.query(
            Resource::VideosByCategory,
            &[("category", Some(category.as_str()))],
            move |backend| async move { backend.get_videos_by_category(category).await }.boxed(),
        )
    }

    pub async fn get_videos_by_category(&self, category: Category) -> ReelResult<QueryOutcome<Vec<VideoMetadata>>> {
        self.read(self.category_query(category)).await
    }

    pub fn watch_videos_by_category(&self, category: Category) -> ReelResult<WatchOutcome<Vec<VideoMetadata>>> {
        self.watch(self.category_query(category))
    }

    fn search_query(&self, term: &str) -> Planned<Vec<VideoMetadata>> {
        let owned = term.to_string();
        self.query(Resource::VideoSearch, &[("search_term", Some(term))], move |backend| {
            let term = owned.clone();
            async move { backend.search_videos(&term).await }.boxed()
        })
    }

    /// Search by term. An empty term disables the read.
    pub async fn search_videos(&self, term: &str) -> ReelResult<QueryOutcome<Vec<VideoMetadata>>> {
        self.read(self.search_query(term)).await
    }

    pub fn watch_search_videos(&self, term: &str) -> ReelResult<WatchOutcome<Vec<VideoMetadata>>> {
        self.watch(self.search_query(term))
    }

    pub async fn upload_video(&self, metadata: &VideoMetadata) -> ReelResult<()> {
        require_text("title", &metadata.title)?;
        require_text("channel_id", &metadata.channel_id)?;
        let scope = MutationScope::new()
            .channel(metadata.channel_id.clone())
            .video(metadata.id.clone());
        self.write(MutationKind::UploadVideo, scope, |backend| async move {
            backend.upload_video(metadata).await
        })
        .await
    }

    pub async fn update_video(&self, video_id: &str, metadata: &VideoMetadata) -> ReelResult<()> {
        require_text("video_id", video_id)?;
        require_text("title", &metadata.title)?;
        let scope = MutationScope::new()
            .channel(metadata.channel_id.clone())
            .video(video_id);
        self.write(MutationKind::UpdateVideo, scope, |backend| async move {
            backend.update_video(video_id, metadata).await
        })
        .await
    }

    pub async fn toggle_video_privacy(&self, video_id: &str) -> ReelResult<()> {
        require_text("video_id", video_id)?;
        let scope = MutationScope::new().video(video_id);
        self.write(MutationKind::ToggleVideoPrivacy, scope, |backend| async move {
            backend.toggle_video_privacy(video_id).await
        })
        .await
    }

    pub async fn delete_video(&self, video_id: &str, channel_id: &str) -> ReelResult<()> {
        require_text("video_id", video_id)?;
        let scope = MutationScope::new().video(video_id).channel(channel_id);
        self.write(MutationKind::DeleteVideo, scope, |backend| async move {
            backend.delete_video(video_id).await
        })
        .await
    }

    pub async fn like_video(&self, video_id: &str) -> ReelResult<()> {
        require_text("video_id", video_id)?;
        let scope = MutationScope::new().video(video_id);
        self.write(MutationKind::LikeVideo, scope, |backend| async move {
            backend.like_video(video_id).await
        })
        .await
    }

    // ========================================================================
    // COMMENTS
    // ========================================================================

    fn comments_query(&self, video_id: Option<&str>) -> Planned<Vec<Comment>> {
        let id = video_id.unwrap_or_default().to_string();
        self.query(Resource::Comments, &[("video_id", video_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_comments(&id).await }.boxed()
        })
    }

    pub async fn get_comments(&self, video_id: Option<&str>) -> ReelResult<QueryOutcome<Vec<Comment>>> {
        self.read(self.comments_query(video_id)).await
    }

    pub fn watch_comments(&self, video_id: Option<&str>) -> ReelResult<WatchOutcome<Vec<Comment>>> {
        self.watch(self.comments_query(video_id))
    }

    pub async fn add_comment(&self, comment: &Comment) -> ReelResult<()> {
        require_text("content", &comment.content)?;
        let scope = MutationScope::new().video(comment.video_id.clone());
        self.write(MutationKind::AddComment, scope, |backend| async move {
            backend.add_comment(comment).await
        })
        .await
    }

    // ========================================================================
    // CHANNELS AND FOLLOWING
    // ========================================================================

    fn channel_query(&self, channel_id: Option<&str>) -> Planned<Option<Channel>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(Resource::Channel, &[("channel_id", channel_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_channel(&id).await }.boxed()
        })
    }

    pub async fn get_channel(&self, channel_id: Option<&str>) -> ReelResult<QueryOutcome<Option<Channel>>> {
        self.read(self.channel_query(channel_id)).await
    }

    pub fn watch_channel(&self, channel_id: Option<&str>) -> ReelResult<WatchOutcome<Option<Channel>>> {
        self.watch(self.channel_query(channel_id))
    }

    fn user_channels_query(&self) -> Planned<Vec<Channel>> {
        self.query(Resource::UserChannels, &[], |backend| {
            async move { backend.get_user_channels().await }.boxed()
        })
    }

    pub async fn get_user_channels(&self) -> ReelResult<QueryOutcome<Vec<Channel>>> {
        self.read(self.user_channels_query()).await
    }

    pub fn watch_user_channels(&self) -> ReelResult<WatchOutcome<Vec<Channel>>> {
        self.watch(self.user_channels_query())
    }

    fn channel_videos_query(&self, channel_id: Option<&str>) -> Planned<Vec<VideoMetadata>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(Resource::ChannelVideos, &[("channel_id", channel_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_channel_videos(&id).await }.boxed()
        })
    }

    pub async fn get_channel_videos(&self, channel_id: Option<&str>) -> ReelResult<QueryOutcome<Vec<VideoMetadata>>> {
        self.read(self.channel_videos_query(channel_id)).await
    }

    pub fn watch_channel_videos(&self, channel_id: Option<&str>) -> ReelResult<WatchOutcome<Vec<VideoMetadata>>> {
        self.watch(self.channel_videos_query(channel_id))
    }

    pub async fn create_channel(&self, channel: &Channel) -> ReelResult<()> {
        require_text("name", &channel.name)?;
        let scope = MutationScope::new().channel(channel.id.clone());
        self.write(MutationKind::CreateChannel, scope, |backend| async move {
            backend.create_channel(channel).await
        })
        .await
    }

    pub async fn update_channel(&self, channel_id: &str, name: &str, profile: &str) -> ReelResult<()> {
        require_text("channel_id", channel_id)?;
        require_text("name", name)?;
        let scope = MutationScope::new().channel(channel_id);
        self.write(MutationKind::UpdateChannel, scope, |backend| async move {
            backend.update_channel(channel_id, name, profile).await
        })
        .await
    }

    fn is_following_query(&self, channel_id: Option<&str>) -> Planned<bool> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(Resource::IsFollowing, &[("channel_id", channel_id)], move |backend| {
            let id = id.clone();
            async move { backend.is_following_channel(&id).await }.boxed()
        })
    }

    pub async fn is_following_channel(&self, channel_id: Option<&str>) -> ReelResult<QueryOutcome<bool>> {
        self.read(self.is_following_query(channel_id)).await
    }

    pub fn watch_is_following_channel(&self, channel_id: Option<&str>) -> ReelResult<WatchOutcome<bool>> {
        self.watch(self.is_following_query(channel_id))
    }

    fn followed_channels_query(&self) -> Planned<Vec<String>> {
        self.query(Resource::FollowedChannels, &[], |backend| {
            async move { backend.get_followed_channels().await }.boxed()
        })
    }

    pub async fn get_followed_channels(&self) -> ReelResult<QueryOutcome<Vec<String>>> {
        self.read(self.followed_channels_query()).await
    }

    pub fn watch_followed_channels(&self) -> ReelResult<WatchOutcome<Vec<String>>> {
        self.watch(self.followed_channels_query())
    }

    fn followers_query(&self, channel_id: Option<&str>) -> Planned<Vec<Principal>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(Resource::ChannelFollowers, &[("channel_id", channel_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_channel_followers(&id).await }.boxed()
        })
    }

    pub async fn get_channel_followers(&self, channel_id: Option<&str>) -> ReelResult<QueryOutcome<Vec<Principal>>> {
        self.read(self.followers_query(channel_id)).await
    }

    pub fn watch_channel_followers(&self, channel_id: Option<&str>) -> ReelResult<WatchOutcome<Vec<Principal>>> {
        self.watch(self.followers_query(channel_id))
    }

    pub async fn follow_channel(&self, channel_id: &str) -> ReelResult<()> {
        require_text("channel_id", channel_id)?;
        let scope = MutationScope::new().channel(channel_id);
        self.write(MutationKind::FollowChannel, scope, |backend| async move {
            backend.follow_channel(channel_id).await
        })
        .await
    }

    pub async fn unfollow_channel(&self, channel_id: &str) -> ReelResult<()> {
        require_text("channel_id", channel_id)?;
        let scope = MutationScope::new().channel(channel_id);
        self.write(MutationKind::UnfollowChannel, scope, |backend| async move {
            backend.unfollow_channel(channel_id).await
        })
        .await
    }

    // ========================================================================
    // MEMBERSHIP TIERS AND SUBSCRIPTIONS
    // ========================================================================

    fn tiers_query(&self, channel_id: Option<&str>) -> Planned<Vec<MembershipTier>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(Resource::MembershipTiers, &[("channel_id", channel_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_channel_membership_tiers(&id).await }.boxed()
        })
    }

    pub async fn get_channel_membership_tiers(
        &self,
        channel_id: Option<&str>,
    ) -> ReelResult<QueryOutcome<Vec<MembershipTier>>> {
        self.read(self.tiers_query(channel_id)).await
    }

    pub fn watch_channel_membership_tiers(
        &self,
        channel_id: Option<&str>,
    ) -> ReelResult<WatchOutcome<Vec<MembershipTier>>> {
        self.watch(self.tiers_query(channel_id))
    }

    fn tier_level_query(&self, channel_id: Option<&str>) -> Planned<Option<u64>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(
            Resource::UserSubscriptionTierLevel,
            &[("channel_id", channel_id)],
            move |backend| {
                let id = id.clone();
                async move { backend.get_user_subscription_tier_level(&id).await }.boxed()
            },
        )
    }

    pub async fn get_user_subscription_tier_level(
        &self,
        channel_id: Option<&str>,
    ) -> ReelResult<QueryOutcome<Option<u64>>> {
        self.read(self.tier_level_query(channel_id)).await
    }

    pub fn watch_user_subscription_tier_level(
        &self,
        channel_id: Option<&str>,
    ) -> ReelResult<WatchOutcome<Option<u64>>> {
        self.watch(self.tier_level_query(channel_id))
    }

    fn active_subscription_query(&self, channel_id: Option<&str>) -> Planned<bool> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(
            Resource::HasActiveSubscription,
            &[("channel_id", channel_id)],
            move |backend| {
                let id = id.clone();
                async move { backend.has_active_subscription(&id).await }.boxed()
            },
        )
    }

    pub async fn has_active_subscription(&self, channel_id: Option<&str>) -> ReelResult<QueryOutcome<bool>> {
        self.read(self.active_subscription_query(channel_id)).await
    }

    pub fn watch_has_active_subscription(&self, channel_id: Option<&str>) -> ReelResult<WatchOutcome<bool>> {
        self.watch(self.active_subscription_query(channel_id))
    }

    pub async fn create_membership_tier(&self, tier: &MembershipTier) -> ReelResult<()> {
        require_text("name", &tier.name)?;
        let scope = MutationScope::new().channel(tier.channel_id.clone());
        self.write(MutationKind::CreateMembershipTier, scope, |backend| async move {
            backend.create_membership_tier(tier).await
        })
        .await
    }

    pub async fn update_membership_tier(&self, tier_id: &str, tier: &MembershipTier) -> ReelResult<()> {
        require_text("tier_id", tier_id)?;
        require_text("name", &tier.name)?;
        let scope = MutationScope::new().channel(tier.channel_id.clone());
        self.write(MutationKind::UpdateMembershipTier, scope, |backend| async move {
            backend.update_membership_tier(tier_id, tier).await
        })
        .await
    }

    pub async fn delete_membership_tier(&self, tier_id: &str, channel_id: &str) -> ReelResult<()> {
        require_text("tier_id", tier_id)?;
        let scope = MutationScope::new().channel(channel_id);
        self.write(MutationKind::DeleteMembershipTier, scope, |backend| async move {
            backend.delete_membership_tier(tier_id).await
        })
        .await
    }

    pub async fn create_subscription(&self, subscription: &Subscription) -> ReelResult<()> {
        require_text("tier_id", &subscription.tier_id)?;
        let scope = MutationScope::new().channel(subscription.channel_id.clone());
        self.write(MutationKind::CreateSubscription, scope, |backend| async move {
            backend.create_subscription(subscription).await
        })
        .await
    }

    pub async fn cancel_subscription(&self, subscription_id: &str, channel_id: &str) -> ReelResult<()> {
        require_text("subscription_id", subscription_id)?;
        let scope = MutationScope::new().channel(channel_id);
        self.write(MutationKind::CancelSubscription, scope, |backend| async move {
            backend.cancel_subscription(subscription_id).await
        })
        .await
    }

    // ========================================================================
    // COURSES
    // ========================================================================

    fn channel_courses_query(&self, channel_id: Option<&str>) -> Planned<Vec<Course>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(Resource::ChannelCourses, &[("channel_id", channel_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_channel_courses(&id).await }.boxed()
        })
    }

    pub async fn get_channel_courses(&self, channel_id: Option<&str>) -> ReelResult<QueryOutcome<Vec<Course>>> {
        self.read(self.channel_courses_query(channel_id)).await
    }

    pub fn watch_channel_courses(&self, channel_id: Option<&str>) -> ReelResult<WatchOutcome<Vec<Course>>> {
        self.watch(self.channel_courses_query(channel_id))
    }

    fn course_query(&self, course_id: Option<&str>) -> Planned<Option<Course>> {
        let id = course_id.unwrap_or_default().to_string();
        self.query(Resource::Course, &[("course_id", course_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_course(&id).await }.boxed()
        })
    }

    pub async fn get_course(&self, course_id: Option<&str>) -> ReelResult<QueryOutcome<Option<Course>>> {
        self.read(self.course_query(course_id)).await
    }

    pub fn watch_course(&self, course_id: Option<&str>) -> ReelResult<WatchOutcome<Option<Course>>> {
        self.watch(self.course_query(course_id))
    }

    fn personalized_courses_query(&self) -> Planned<Vec<Course>> {
        self.query(Resource::PersonalizedCourses, &[], |backend| {
            async move { backend.get_personalized_courses().await }.boxed()
        })
    }

    pub async fn get_personalized_courses(&self) -> ReelResult<QueryOutcome<Vec<Course>>> {
        self.read(self.personalized_courses_query()).await
    }

    pub fn watch_personalized_courses(&self) -> ReelResult<WatchOutcome<Vec<Course>>> {
        self.watch(self.personalized_courses_query())
    }

    pub async fn create_course(&self, course: &Course) -> ReelResult<()> {
        require_text("title", &course.title)?;
        let scope = MutationScope::new()
            .channel(course.channel_id.clone())
            .course(course.id.clone());
        self.write(MutationKind::CreateCourse, scope, |backend| async move {
            backend.create_course(course).await
        })
        .await
    }

    pub async fn update_course(&self, course_id: &str, course: &Course) -> ReelResult<()> {
        require_text("course_id", course_id)?;
        require_text("title", &course.title)?;
        let scope = MutationScope::new()
            .channel(course.channel_id.clone())
            .course(course_id);
        self.write(MutationKind::UpdateCourse, scope, |backend| async move {
            backend.update_course(course_id, course).await
        })
        .await
    }

    pub async fn delete_course(&self, course_id: &str, channel_id: &str) -> ReelResult<()> {
        require_text("course_id", course_id)?;
        let scope = MutationScope::new().channel(channel_id).course(course_id);
        self.write(MutationKind::DeleteCourse, scope, |backend| async move {
            backend.delete_course(course_id).await
        })
        .await
    }

    // ========================================================================
    // PLAYLISTS
    // ========================================================================

    fn user_playlists_query(&self) -> Planned<Vec<Playlist>> {
        self.query(Resource::UserPlaylists, &[], |backend| {
            async move { backend.get_user_playlists().await }.boxed()
        })
    }

    pub async fn get_user_playlists(&self) -> ReelResult<QueryOutcome<Vec<Playlist>>> {
        self.read(self.user_playlists_query()).await
    }

    pub fn watch_user_playlists(&self) -> ReelResult<WatchOutcome<Vec<Playlist>>> {
        self.watch(self.user_playlists_query())
    }

    fn public_playlists_query(&self) -> Planned<Vec<Playlist>> {
        self.query(Resource::PublicPlaylists, &[], |backend| {
            async move { backend.get_public_playlists().await }.boxed()
        })
    }

    pub async fn get_public_playlists(&self) -> ReelResult<QueryOutcome<Vec<Playlist>>> {
        self.read(self.public_playlists_query()).await
    }

    pub fn watch_public_playlists(&self) -> ReelResult<WatchOutcome<Vec<Playlist>>> {
        self.watch(self.public_playlists_query())
    }

    fn playlist_query(&self, playlist_id: Option<&str>) -> Planned<Option<Playlist>> {
        let id = playlist_id.unwrap_or_default().to_string();
        self.query(Resource::Playlist, &[("playlist_id", playlist_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_playlist(&id).await }.boxed()
        })
    }

    pub async fn get_playlist(&self, playlist_id: Option<&str>) -> ReelResult<QueryOutcome<Option<Playlist>>> {
        self.read(self.playlist_query(playlist_id)).await
    }

    pub fn watch_playlist(&self, playlist_id: Option<&str>) -> ReelResult<WatchOutcome<Option<Playlist>>> {
        self.watch(self.playlist_query(playlist_id))
    }

    pub async fn create_playlist(&self, playlist: &Playlist) -> ReelResult<()> {
        require_text("title", &playlist.title)?;
        let scope = MutationScope::new().playlist(playlist.id.clone());
        self.write(MutationKind::CreatePlaylist, scope, |backend| async move {
            backend.create_playlist(playlist).await
        })
        .await
    }

    pub async fn update_playlist(&self, playlist_id: &str, playlist: &Playlist) -> ReelResult<()> {
        require_text("playlist_id", playlist_id)?;
        require_text("title", &playlist.title)?;
        let scope = MutationScope::new().playlist(playlist_id);
        self.write(MutationKind::UpdatePlaylist, scope, |backend| async move {
            backend.update_playlist(playlist_id, playlist).await
        })
        .await
    }

    pub async fn delete_playlist(&self, playlist_id: &str) -> ReelResult<()> {
        require_text("playlist_id", playlist_id)?;
        let scope = MutationScope::new().playlist(playlist_id);
        self.write(MutationKind::DeletePlaylist, scope, |backend| async move {
            backend.delete_playlist(playlist_id).await
        })
        .await
    }

    // ========================================================================
    // DONATIONS
    // ========================================================================

    fn channel_donations_query(&self, channel_id: Option<&str>) -> Planned<Vec<Donation>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(Resource::ChannelDonations, &[("channel_id", channel_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_channel_donations(&id).await }.boxed()
        })
    }

    pub async fn get_channel_donations(&self, channel_id: Option<&str>) -> ReelResult<QueryOutcome<Vec<Donation>>> {
        self.read(self.channel_donations_query(channel_id)).await
    }

    pub fn watch_channel_donations(&self, channel_id: Option<&str>) -> ReelResult<WatchOutcome<Vec<Donation>>> {
        self.watch(self.channel_donations_query(channel_id))
    }

    fn donation_history_query(&self) -> Planned<Vec<Donation>> {
        self.query(Resource::UserDonationHistory, &[], |backend| {
            async move { backend.get_user_donation_history().await }.boxed()
        })
    }

    pub async fn get_user_donation_history(&self) -> ReelResult<QueryOutcome<Vec<Donation>>> {
        self.read(self.donation_history_query()).await
    }

    pub fn watch_user_donation_history(&self) -> ReelResult<WatchOutcome<Vec<Donation>>> {
        self.watch(self.donation_history_query())
    }

    pub async fn record_donation(&self, donation: &Donation) -> ReelResult<()> {
        require_positive("amount_usd", donation.amount_usd)?;
        require_text("channel_id", &donation.channel_id)?;
        let scope = MutationScope::new().channel(donation.channel_id.clone());
        self.write(MutationKind::RecordDonation, scope, |backend| async move {
            backend.record_donation(donation).await
        })
        .await
    }

    /// Donation totals and recent donations next to the tier count.
    ///
    /// Ready only when both underlying reads are.
    pub async fn get_channel_analytics(
        &self,
        channel_id: Option<&str>,
    ) -> ReelResult<QueryOutcome<ChannelAnalytics>> {
        let (donations, tiers) = futures_util::try_join!(
            self.get_channel_donations(channel_id),
            self.get_channel_membership_tiers(channel_id),
        )?;
        let tiers = match tiers {
            QueryOutcome::Ready(read) => read.into_value(),
            QueryOutcome::NotReady(reason) => return Ok(QueryOutcome::NotReady(reason)),
        };
        Ok(donations.map(|donations| channel_analytics(&donations, &tiers)))
    }

    // ========================================================================
    // STRIPE
    // ========================================================================

    fn stripe_accounts_query(&self) -> Planned<Vec<StripeAccount>> {
        self.query(Resource::UserStripeAccounts, &[], |backend| {
            async move { backend.get_user_stripe_accounts().await }.boxed()
        })
    }

    pub async fn get_user_stripe_accounts(&self) -> ReelResult<QueryOutcome<Vec<StripeAccount>>> {
        self.read(self.stripe_accounts_query()).await
    }

    pub fn watch_user_stripe_accounts(&self) -> ReelResult<WatchOutcome<Vec<StripeAccount>>> {
        self.watch(self.stripe_accounts_query())
    }

    fn stripe_account_query(&self, account_id: Option<&str>) -> Planned<Option<StripeAccount>> {
        let id = account_id.unwrap_or_default().to_string();
        self.query(Resource::StripeAccount, &[("account_id", account_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_stripe_account(&id).await }.boxed()
        })
    }

    pub async fn get_stripe_account(&self, account_id: Option<&str>) -> ReelResult<QueryOutcome<Option<StripeAccount>>> {
        self.read(self.stripe_account_query(account_id)).await
    }

    pub fn watch_stripe_account(&self, account_id: Option<&str>) -> ReelResult<WatchOutcome<Option<StripeAccount>>> {
        self.watch(self.stripe_account_query(account_id))
    }

    pub async fn create_stripe_account(&self, account: &StripeAccount) -> ReelResult<()> {
        require_text("account_name", &account.account_name)?;
        let scope = MutationScope::new().stripe_account(account.id.clone());
        self.write(MutationKind::CreateStripeAccount, scope, |backend| async move {
            backend.create_stripe_account(account).await
        })
        .await
    }

    pub async fn update_stripe_account(&self, account_id: &str, account: &StripeAccount) -> ReelResult<()> {
        require_text("account_id", account_id)?;
        let scope = MutationScope::new().stripe_account(account_id);
        self.write(MutationKind::UpdateStripeAccount, scope, |backend| async move {
            backend.update_stripe_account(account_id, account).await
        })
        .await
    }

    pub async fn delete_stripe_account(&self, account_id: &str) -> ReelResult<()> {
        require_text("account_id", account_id)?;
        let scope = MutationScope::new().stripe_account(account_id);
        self.write(MutationKind::DeleteStripeAccount, scope, |backend| async move {
            backend.delete_stripe_account(account_id).await
        })
        .await
    }

    fn stripe_connection_query(&self, channel_id: Option<&str>) -> Planned<Option<ChannelStripeConnection>> {
        let id = channel_id.unwrap_or_default().to_string();
        self.query(
            Resource::ChannelStripeConnection,
            &[("channel_id", channel_id)],
            move |backend| {
                let id = id.clone();
                async move { backend.get_channel_stripe_connection(&id).await }.boxed()
            },
        )
    }

    pub async fn get_channel_stripe_connection(
        &self,
        channel_id: Option<&str>,
    ) -> ReelResult<QueryOutcome<Option<ChannelStripeConnection>>> {
        self.read(self.stripe_connection_query(channel_id)).await
    }

    pub fn watch_channel_stripe_connection(
        &self,
        channel_id: Option<&str>,
    ) -> ReelResult<WatchOutcome<Option<ChannelStripeConnection>>> {
        self.watch(self.stripe_connection_query(channel_id))
    }

    pub async fn connect_channel_to_stripe_account(
        &self,
        connection: &ChannelStripeConnection,
    ) -> ReelResult<()> {
        require_text("stripe_account_id", &connection.stripe_account_id)?;
        let scope = MutationScope::new()
            .channel(connection.channel_id.clone())
            .stripe_account(connection.stripe_account_id.clone());
        self.write(MutationKind::ConnectChannelToStripeAccount, scope, |backend| async move {
            backend.connect_channel_to_stripe_account(connection).await
        })
        .await
    }

    fn stripe_configured_query(&self) -> Planned<bool> {
        self.query(Resource::IsStripeConfigured, &[], |backend| {
            async move { backend.is_stripe_configured().await }.boxed()
        })
    }

    pub async fn is_stripe_configured(&self) -> ReelResult<QueryOutcome<bool>> {
        self.read(self.stripe_configured_query()).await
    }

    pub fn watch_is_stripe_configured(&self) -> ReelResult<WatchOutcome<bool>> {
        self.watch(self.stripe_configured_query())
    }

    pub async fn set_stripe_configuration(&self, config: &StripeConfiguration) -> ReelResult<()> {
        require_text("secret_key", &config.secret_key)?;
        self.write(MutationKind::SetStripeConfiguration, MutationScope::new(), |backend| async move {
            backend.set_stripe_configuration(config).await
        })
        .await
    }

    fn session_status_query(&self, session_id: Option<&str>) -> Planned<StripeSessionStatus> {
        let id = session_id.unwrap_or_default().to_string();
        self.query(Resource::StripeSessionStatus, &[("session_id", session_id)], move |backend| {
            let id = id.clone();
            async move { backend.get_stripe_session_status(&id).await }.boxed()
        })
    }

    pub async fn get_stripe_session_status(
        &self,
        session_id: Option<&str>,
    ) -> ReelResult<QueryOutcome<StripeSessionStatus>> {
        self.read(self.session_status_query(session_id)).await
    }

    pub fn watch_stripe_session_status(
        &self,
        session_id: Option<&str>,
    ) -> ReelResult<WatchOutcome<StripeSessionStatus>> {
        self.watch(self.session_status_query(session_id))
    }

    /// Start a checkout session and return the processor's redirect URL.
    pub async fn create_checkout_session(
        &self,
        items: &[ShoppingItem],
        urls: &PaymentUrls,
    ) -> ReelResult<String> {
        if items.is_empty() {
            return Err(ValidationError::RequiredParameterMissing {
                parameter: "items".to_string(),
            }
            .into());
        }
        for item in items {
            require_text("product_name", &item.product_name)?;
            require_positive("quantity", item.quantity)?;
        }
        self.write(MutationKind::CreateCheckoutSession, MutationScope::new(), |backend| async move {
            backend
                .create_checkout_session(items, &urls.success_url, &urls.cancel_url)
                .await
        })
        .await
    }

    /// Checkout for a subscription or donation, with redirect URLs built
    /// from `base_url`.
    pub async fn start_checkout(
        &self,
        kind: PaymentKind,
        items: &[ShoppingItem],
        base_url: &str,
        channel_id: Option<&str>,
    ) -> ReelResult<String> {
        let urls = PaymentUrls::new(base_url, kind, channel_id)?;
        self.create_checkout_session(items, &urls).await
    }
}
