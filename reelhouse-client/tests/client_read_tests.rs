//! Gated, cached reads through the client.

mod support;

use reelhouse_cache::{EntryStatus, NotReady, QueryOutcome};
use reelhouse_core::{Category, Principal, ReelError, RemoteError};
use reelhouse_test_utils::fixtures;
use support::{eventually, Harness};

#[tokio::test]
async fn test_missing_parameter_disables_read() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    h.store.reset_calls();

    let outcome = h.client.get_video(None).await.unwrap();
    assert_eq!(outcome.not_ready_reason(), Some(NotReady::MissingParameter("video_id")));

    let outcome = h.client.get_channel_videos(Some("")).await.unwrap();
    assert_eq!(outcome.not_ready_reason(), Some(NotReady::MissingParameter("channel_id")));

    let outcome = h.client.search_videos("").await.unwrap();
    assert_eq!(outcome.not_ready_reason(), Some(NotReady::MissingParameter("search_term")));

    let outcome = h.client.get_user_profile(None).await.unwrap();
    assert_eq!(outcome.not_ready_reason(), Some(NotReady::MissingParameter("principal")));

    assert_eq!(h.store.total_calls(), 0);
    assert!(h.client.cache().is_empty().unwrap());
}

#[tokio::test]
async fn test_caller_scoped_reads_wait_for_login() {
    let h = Harness::new(fixtures::two_channel_store());
    h.client.session().initialize().await;

    let outcome = h.client.get_user_channels().await.unwrap();
    assert_eq!(outcome.not_ready_reason(), Some(NotReady::NotAuthenticated));
    let outcome = h.client.is_following_channel(Some("chan-b")).await.unwrap();
    assert_eq!(outcome.not_ready_reason(), Some(NotReady::NotAuthenticated));
    assert_eq!(h.store.total_calls(), 0);

    h.provider.succeed_as("alice");
    h.client.session().login().await;

    let channels = h.client.get_user_channels().await.unwrap().into_value().unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, "chan-a");
    assert_eq!(h.store.calls("getUserChannels"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reads_share_one_fetch() {
    let store = fixtures::two_channel_store();
    store.insert_course(fixtures::course("course-1", "chan-a", &["vid-a1"]));
    let h = Harness::logged_in(store, "alice").await;

    let gate = h.store.hold("getCourse");
    let first = {
        let client = h.client.clone();
        tokio::spawn(async move { client.get_course(Some("course-1")).await })
    };
    eventually(|| h.store.calls("getCourse") == 1).await;
    let second = {
        let client = h.client.clone();
        tokio::spawn(async move { client.get_course(Some("course-1")).await })
    };
    eventually(|| h.client.cache().stats().map(|s| s.deduplicated).unwrap_or(0) == 1).await;

    gate.open();
    let first = first.await.unwrap().unwrap().into_value().flatten();
    let second = second.await.unwrap().unwrap().into_value().flatten();
    assert_eq!(first, second);
    assert_eq!(h.store.calls("getCourse"), 1);

    // Cached until invalidated.
    let third = h.client.get_course(Some("course-1")).await.unwrap().ready().unwrap();
    assert!(third.was_cache_hit());
    assert_eq!(h.store.calls("getCourse"), 1);
}

#[tokio::test]
async fn test_volatile_reads_refetch_every_time() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    h.store.reset_calls();

    h.client.get_channel_videos(Some("chan-a")).await.unwrap();
    h.client.get_channel_videos(Some("chan-a")).await.unwrap();
    assert_eq!(h.store.calls("getChannelVideos"), 2);
}

#[tokio::test]
async fn test_all_videos_gathers_every_category() {
    let store = fixtures::two_channel_store();
    let mut music = fixtures::video("vid-music", "chan-b");
    music.category = Category::Music;
    store.insert_video(music);
    let mut hidden = fixtures::video("vid-hidden", "chan-a");
    hidden.is_private = true;
    store.insert_video(hidden);
    let h = Harness::logged_in(store, "alice").await;
    h.store.reset_calls();

    let mut ids: Vec<String> = h
        .client
        .get_all_videos()
        .await
        .unwrap()
        .into_value()
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();
    ids.sort();

    assert_eq!(ids, vec!["vid-a1", "vid-b1", "vid-music"]);
    assert_eq!(h.store.calls("getVideosByCategory"), Category::ALL.len());
}

#[tokio::test]
async fn test_failed_read_retries_then_surfaces_error() {
    let store = fixtures::two_channel_store();
    store.insert_course(fixtures::course("course-1", "chan-a", &[]));
    store.fail("getCourse", "canister trapped");
    let h = Harness::logged_in(store, "alice").await;

    let err = h.client.get_course(Some("course-1")).await.unwrap_err();
    assert!(matches!(err, ReelError::Remote(RemoteError::Rejected { .. })));
    let retries = h.client.cache().policies().get(reelhouse_cache::Resource::Course).retry_count;
    assert_eq!(h.store.calls("getCourse"), 1 + retries as usize);

    // The profile read is never retried.
    h.store.fail("getCallerUserProfile", "boom");
    assert!(h.client.get_caller_user_profile().await.is_err());
    assert_eq!(h.store.calls("getCallerUserProfile"), 1);
}

#[tokio::test]
async fn test_watch_reports_not_ready_then_tracks_value() {
    let h = Harness::new(fixtures::two_channel_store());

    let watched = h.client.watch_video(Some("vid-a1")).unwrap();
    assert_eq!(watched.not_ready_reason(), Some(NotReady::HandleNotReady));

    h.client.session().initialize().await;
    let subscription = h
        .client
        .watch_video(Some("vid-a1"))
        .unwrap()
        .into_subscription()
        .unwrap();
    let video = subscription.settled().await.unwrap().into_value();
    assert_eq!(video.map(|v| v.title), Some("Video vid-a1".to_string()));
    assert_eq!(h.client.cache().subscriber_count(subscription.key()).unwrap(), 1);

    drop(subscription);
    let key = reelhouse_cache::QueryKey::new(reelhouse_cache::Resource::Video, ["vid-a1"]);
    assert_eq!(h.client.cache().subscriber_count(&key).unwrap(), 0);
}

#[tokio::test]
async fn test_channel_analytics_combines_donations_and_tiers() {
    let store = fixtures::two_channel_store();
    store.insert_tier(fixtures::tier("tier-1", "chan-a", 1));
    store.insert_tier(fixtures::tier("tier-2", "chan-a", 2));
    store.insert_donation(fixtures::donation("don-1", "chan-a", 5, 10));
    store.insert_donation(fixtures::donation("don-2", "chan-a", 20, 30));
    store.insert_donation(fixtures::donation("don-3", "chan-b", 99, 20));
    let h = Harness::logged_in(store, "alice").await;

    let analytics = h
        .client
        .get_channel_analytics(Some("chan-a"))
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(analytics.total_donations_usd, 25);
    assert_eq!(analytics.donation_count, 2);
    assert_eq!(analytics.tier_count, 2);
    assert_eq!(analytics.recent_donations[0].id, "don-2");
    assert_eq!(analytics.total_subscribers, None);

    let outcome = h.client.get_channel_analytics(None).await.unwrap();
    assert_eq!(outcome.not_ready_reason(), Some(NotReady::MissingParameter("channel_id")));
}

#[tokio::test]
async fn test_full_video_joins_channel() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;

    let full = h
        .client
        .get_full_video(Some("vid-b1"))
        .await
        .unwrap()
        .into_value()
        .flatten()
        .unwrap();
    assert_eq!(full.channel.principal, Principal::from_text("bob"));

    let missing = h.client.get_full_video(Some("nope")).await.unwrap();
    assert!(matches!(missing, QueryOutcome::Ready(ref read) if read.value().is_none()));
}

#[tokio::test]
async fn test_invalidated_entry_reports_stale_until_read() {
    let store = fixtures::two_channel_store();
    store.insert_course(fixtures::course("course-1", "chan-a", &[]));
    let h = Harness::logged_in(store, "alice").await;

    h.client.get_course(Some("course-1")).await.unwrap();
    let key = reelhouse_cache::QueryKey::new(reelhouse_cache::Resource::Course, ["course-1"]);
    assert_eq!(h.client.cache().status(&key).unwrap(), Some(EntryStatus::Fresh));

    let mut course = fixtures::course("course-1", "chan-a", &["vid-a1"]);
    course.title = "Renamed".to_string();
    h.client.update_course("course-1", &course).await.unwrap();
    assert_eq!(h.client.cache().status(&key).unwrap(), Some(EntryStatus::Stale));

    let read = h.client.get_course(Some("course-1")).await.unwrap().into_value().flatten();
    assert_eq!(read.map(|c| c.title), Some("Renamed".to_string()));
}
