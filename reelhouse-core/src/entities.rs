//! Records exchanged with the backend service

use crate::{ChannelId, Principal, Time, VideoId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Video category used for browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Music,
    Gaming,
    Education,
    Vlog,
    Comedy,
    Other,
}

impl Category {
    /// Every category, in the order the home feed lists them.
    pub const ALL: [Category; 6] = [
        Category::Music,
        Category::Gaming,
        Category::Education,
        Category::Vlog,
        Category::Comedy,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Music => "music",
            Category::Gaming => "gaming",
            Category::Education => "education",
            Category::Vlog => "vlog",
            Category::Comedy => "comedy",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A creator channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub principal: Principal,
    pub name: String,
    pub profile: String,
}

/// Metadata for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub channel_id: ChannelId,
    pub category: Category,
    pub video_url: String,
    pub thumbnail_url: String,
    pub upload_date: Time,
    pub view_count: u64,
    pub like_count: u64,
    pub is_private: bool,
    /// Minimum membership tier level needed to watch, if gated.
    pub required_tier_level: Option<u64>,
}

/// A video together with the channel that published it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullVideo {
    pub video: VideoMetadata,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub video_id: VideoId,
    pub author: Principal,
    pub content: String,
    pub timestamp: Time,
}

/// An ordered collection of channel videos, optionally tier-gated or priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub channel_id: ChannelId,
    pub video_ids: Vec<VideoId>,
    pub is_visible: bool,
    pub course_image: Option<String>,
    pub price_usd: Option<u64>,
    pub required_tier_level: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaylistVisibility {
    PublicVisibility,
    PrivateVisibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator: Principal,
    pub visibility: PlaylistVisibility,
    pub video_ids: Vec<VideoId>,
}

/// Paid membership level offered by a channel. Higher levels include lower ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipTier {
    pub id: String,
    pub channel_id: ChannelId,
    pub name: String,
    pub description: String,
    pub tier_level: u64,
    pub price_usd: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub user: Principal,
    pub channel_id: ChannelId,
    pub tier_id: String,
    pub status: SubscriptionStatus,
    pub start_date: Time,
    pub next_billing_date: Time,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub channel_id: ChannelId,
    pub donor: Principal,
    pub amount_usd: u64,
    pub message: Option<String>,
    pub timestamp: Time,
}

/// Payout account registered by a creator.
///
/// `Debug` redacts the secret key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeAccount {
    pub id: String,
    pub owner: Principal,
    pub account_name: String,
    pub secret_key: String,
    pub connect_id: Option<String>,
    pub payout_settings: Option<String>,
}

impl fmt::Debug for StripeAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeAccount")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("account_name", &self.account_name)
            .field("secret_key", &"[REDACTED]")
            .field("connect_id", &self.connect_id)
            .field("payout_settings", &self.payout_settings)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStripeConnection {
    pub channel_id: ChannelId,
    pub stripe_account_id: String,
}

/// Platform-wide payment processor configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeConfiguration {
    pub secret_key: String,
    pub allowed_countries: Vec<String>,
}

impl fmt::Debug for StripeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfiguration")
            .field("secret_key", &"[REDACTED]")
            .field("allowed_countries", &self.allowed_countries)
            .finish()
    }
}

/// Line item of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub product_name: String,
    pub product_description: String,
    pub currency: String,
    pub quantity: u64,
    pub price_in_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StripeSessionStatus {
    #[serde(rename_all = "camelCase")]
    Completed {
        response: String,
        user_principal: Option<String>,
    },
    Failed { error: String },
}

impl StripeSessionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
    Guest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_names() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn test_video_uses_camel_case_fields() {
        let video = VideoMetadata {
            id: "v1".to_string(),
            title: "Intro".to_string(),
            description: String::new(),
            channel_id: "c1".to_string(),
            category: Category::Education,
            video_url: "https://cdn/v1.mp4".to_string(),
            thumbnail_url: "https://cdn/v1.png".to_string(),
            upload_date: 1,
            view_count: 0,
            like_count: 0,
            is_private: false,
            required_tier_level: Some(2),
        };
        let value = serde_json::to_value(&video).unwrap();
        assert_eq!(value["channelId"], "c1");
        assert_eq!(value["requiredTierLevel"], 2);
        assert_eq!(value["isPrivate"], false);
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let account = StripeAccount {
            id: "acct".to_string(),
            owner: Principal::from_text("owner"),
            account_name: "Main".to_string(),
            secret_key: "sk_live_123".to_string(),
            connect_id: None,
            payout_settings: None,
        };
        let debug = format!("{:?}", account);
        assert!(!debug.contains("sk_live_123"));
        assert!(debug.contains("REDACTED"));

        let config = StripeConfiguration {
            secret_key: "sk_live_456".to_string(),
            allowed_countries: vec!["US".to_string()],
        };
        assert!(!format!("{:?}", config).contains("sk_live_456"));
    }

    #[test]
    fn test_session_status_tagging() {
        let status = StripeSessionStatus::Failed {
            error: "card declined".to_string(),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["kind"], "failed");
        assert!(!status.is_completed());
    }
}
