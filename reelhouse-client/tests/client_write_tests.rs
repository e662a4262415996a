//! Writes: one remote call, then invalidation of exactly the dependent reads.

mod support;

use reelhouse_cache::{QueryKey, Resource};
use reelhouse_core::{PaymentKind, UserRole};
use reelhouse_test_utils::assertions::{assert_handle_not_ready, assert_rejected, assert_validation_error};
use reelhouse_test_utils::{fixtures, MockStore, CHECKOUT_URL_PREFIX};
use support::Harness;

#[tokio::test]
async fn test_upload_invalidates_own_channel_and_video_lists_only() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;

    let own = h.client.watch_channel_videos(Some("chan-a")).unwrap().into_subscription().unwrap();
    let other = h.client.watch_channel_videos(Some("chan-b")).unwrap().into_subscription().unwrap();
    let all = h.client.watch_all_videos().unwrap().into_subscription().unwrap();
    own.settled().await.unwrap();
    other.settled().await.unwrap();
    all.settled().await.unwrap();
    h.store.reset_calls();

    let upload = fixtures::video("vid-a2", "chan-a");
    h.client.upload_video(&upload).await.unwrap();

    assert_eq!(h.store.calls("uploadVideo"), 1);
    // Only chan-a's list refetched; all-videos fans out across categories.
    assert_eq!(h.store.calls("getChannelVideos"), 1);
    assert_eq!(h.store.calls("getVideosByCategory"), 6);

    let own_videos = own.peek().unwrap().unwrap().into_value();
    assert_eq!(own_videos.len(), 2);
    assert_eq!(other.peek().unwrap().unwrap().value().len(), 1);
    assert_eq!(all.peek().unwrap().unwrap().value().len(), 3);
}

#[tokio::test]
async fn test_failed_write_invalidates_nothing_and_is_not_retried() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    let own = h.client.watch_channel_videos(Some("chan-a")).unwrap().into_subscription().unwrap();
    own.settled().await.unwrap();
    h.store.reset_calls();
    h.store.fail("uploadVideo", "Unauthorized");

    let result = h.client.upload_video(&fixtures::video("vid-a2", "chan-a")).await;

    assert_rejected(&result, "uploadVideo");
    assert_eq!(h.store.calls("uploadVideo"), 1);
    assert_eq!(h.store.calls("getChannelVideos"), 0);
    assert_eq!(h.client.cache().stats().unwrap().invalidations, 0);
}

#[tokio::test]
async fn test_backend_authorization_failures_surface_as_rejections() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "bob").await;

    let result = h.client.upload_video(&fixtures::video("vid-x", "chan-a")).await;

    assert_rejected(&result, "uploadVideo");
    assert_eq!(h.store.video_count(), 2);
}

#[tokio::test]
async fn test_write_before_handle_is_ready_fails_without_calling() {
    let h = Harness::new(fixtures::two_channel_store());

    let result = h.client.follow_channel("chan-b").await;

    assert_handle_not_ready(&result);
    assert_eq!(h.store.total_calls(), 0);
}

#[tokio::test]
async fn test_invalid_inputs_are_rejected_before_any_call() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    h.store.reset_calls();

    let donation = fixtures::donation("don-1", "chan-b", 0, 1);
    assert_validation_error(&h.client.record_donation(&donation).await);

    let comment = fixtures::comment("c-1", "vid-b1", "   ");
    assert_validation_error(&h.client.add_comment(&comment).await);

    let mut video = fixtures::video("vid-a2", "chan-a");
    video.title = String::new();
    assert_validation_error(&h.client.upload_video(&video).await);

    assert_validation_error(
        &h.client
            .start_checkout(PaymentKind::Donation, &[], "https://reelhouse.video", Some("chan-b"))
            .await,
    );
    let zero = fixtures::shopping_item("Donation", 0, 500);
    assert_validation_error(
        &h.client
            .start_checkout(PaymentKind::Donation, &[zero], "https://reelhouse.video", None)
            .await,
    );
    let item = fixtures::shopping_item("Donation", 1, 500);
    assert_validation_error(
        &h.client
            .start_checkout(PaymentKind::Donation, &[item], "reelhouse.video", None)
            .await,
    );

    assert_eq!(h.store.total_calls(), 0);
}

#[tokio::test]
async fn test_follow_refreshes_following_state() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    let following = h
        .client
        .watch_is_following_channel(Some("chan-b"))
        .unwrap()
        .into_subscription()
        .unwrap();
    let followed = h.client.watch_followed_channels().unwrap().into_subscription().unwrap();
    assert!(!following.settled().await.unwrap().into_value());
    assert!(followed.settled().await.unwrap().into_value().is_empty());

    h.client.follow_channel("chan-b").await.unwrap();
    assert!(following.peek().unwrap().unwrap().into_value());
    assert_eq!(followed.peek().unwrap().unwrap().into_value(), vec!["chan-b".to_string()]);

    h.client.unfollow_channel("chan-b").await.unwrap();
    assert!(!following.peek().unwrap().unwrap().into_value());
}

#[tokio::test]
async fn test_donation_refreshes_channel_donations_and_history() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    let donations = h
        .client
        .watch_channel_donations(Some("chan-b"))
        .unwrap()
        .into_subscription()
        .unwrap();
    let history = h.client.watch_user_donation_history().unwrap().into_subscription().unwrap();
    donations.settled().await.unwrap();
    history.settled().await.unwrap();

    h.client
        .record_donation(&fixtures::donation("don-1", "chan-b", 15, 100))
        .await
        .unwrap();

    assert_eq!(donations.peek().unwrap().unwrap().value().len(), 1);
    assert_eq!(history.peek().unwrap().unwrap().value()[0].amount_usd, 15);
    assert_eq!(h.store.donation_count(), 1);
}

#[tokio::test]
async fn test_comment_invalidates_only_that_videos_comments() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    h.client.get_comments(Some("vid-a1")).await.unwrap();
    h.client.get_comments(Some("vid-b1")).await.unwrap();

    h.client
        .add_comment(&fixtures::comment("c-1", "vid-b1", "great video"))
        .await
        .unwrap();

    let cache = h.client.cache();
    assert_eq!(cache.stats().unwrap().invalidations, 1);
    assert!(cache.contains(&QueryKey::new(Resource::Comments, ["vid-a1"])).unwrap());

    let comments = h.client.get_comments(Some("vid-b1")).await.unwrap().into_value().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].author, reelhouse_core::Principal::from_text("alice"));
}

#[tokio::test]
async fn test_delete_video_invalidates_record_and_owner_lists() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    let record = h.client.watch_video(Some("vid-a1")).unwrap().into_subscription().unwrap();
    assert!(record.settled().await.unwrap().value().is_some());

    h.client.delete_video("vid-a1", "chan-a").await.unwrap();

    assert_eq!(record.peek().unwrap().unwrap().into_value(), None);
    assert_eq!(h.store.video("vid-a1"), None);
}

#[tokio::test]
async fn test_admin_configures_stripe_then_checkout_starts() {
    let store = MockStore::new();
    store.insert_channel(fixtures::channel("chan-a", "alice"));
    store.set_role(fixtures::principal("alice"), UserRole::Admin);
    let h = Harness::logged_in(store, "alice").await;

    let configured = h
        .client
        .watch_is_stripe_configured()
        .unwrap()
        .into_subscription()
        .unwrap();
    assert!(!configured.settled().await.unwrap().into_value());

    h.client
        .set_stripe_configuration(&fixtures::stripe_configuration())
        .await
        .unwrap();
    assert!(configured.peek().unwrap().unwrap().into_value());

    let items = [fixtures::shopping_item("Tier 1", 1, 500)];
    let url = h
        .client
        .start_checkout(PaymentKind::Subscription, &items, "https://reelhouse.video/", Some("chan-a"))
        .await
        .unwrap();
    assert!(url.starts_with(CHECKOUT_URL_PREFIX));

    let session_id = url.trim_start_matches(CHECKOUT_URL_PREFIX);
    let status = h
        .client
        .get_stripe_session_status(Some(session_id))
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert!(status.is_completed());
}

#[tokio::test]
async fn test_stripe_account_lifecycle_refreshes_account_lists() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    let accounts = h.client.watch_user_stripe_accounts().unwrap().into_subscription().unwrap();
    accounts.settled().await.unwrap();

    let account = fixtures::stripe_account("acct-1", "alice");
    h.client.create_stripe_account(&account).await.unwrap();
    assert_eq!(accounts.peek().unwrap().unwrap().value().len(), 1);

    let connection = reelhouse_core::ChannelStripeConnection {
        channel_id: "chan-a".to_string(),
        stripe_account_id: "acct-1".to_string(),
    };
    h.client.connect_channel_to_stripe_account(&connection).await.unwrap();
    let connected = h
        .client
        .get_channel_stripe_connection(Some("chan-a"))
        .await
        .unwrap()
        .into_value()
        .flatten();
    assert_eq!(connected, Some(connection));

    h.client.delete_stripe_account("acct-1").await.unwrap();
    assert!(accounts.peek().unwrap().unwrap().value().is_empty());
}

#[tokio::test]
async fn test_tier_created_without_watchers_shows_on_next_watch() {
    let h = Harness::logged_in(fixtures::two_channel_store(), "alice").await;
    let before = h
        .client
        .get_channel_membership_tiers(Some("chan-a"))
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert!(before.is_empty());

    let tier = fixtures::tier("tier-1", "chan-a", 1);
    h.client.create_membership_tier(&tier).await.unwrap();
    assert_eq!(h.store.calls("getChannelMembershipTiers"), 1);

    let tiers = h
        .client
        .watch_channel_membership_tiers(Some("chan-a"))
        .unwrap()
        .into_subscription()
        .unwrap();
    let after = tiers.settled().await.unwrap().into_value();

    assert_eq!(after, vec![tier]);
    assert_eq!(h.store.calls("getChannelMembershipTiers"), 2);
}
