//! Tier access checks and list filtering used by the watch and channel views.

use crate::{Category, Channel, Course, Donation, Identity, MembershipTier, VideoMetadata};

/// Number of donations shown in the analytics feed.
const RECENT_DONATIONS: usize = 5;

/// Decide whether a holder of `held` tier level may see content gated at `required`.
///
/// Ungated content is open to everyone. Gated content requires a held level
/// at or above the requirement; callers without a subscription are denied.
pub fn has_tier_access(required: Option<u64>, held: Option<u64>) -> bool {
    match (required, held) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(required), Some(held)) => held >= required,
    }
}

/// A membership tier as presented to a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierView<'a> {
    pub tier: &'a MembershipTier,
    /// The viewer's subscription is exactly this tier.
    pub is_current: bool,
    /// The viewer's subscription includes this tier.
    pub grants_access: bool,
}

/// Tiers sorted by ascending level, annotated against the viewer's held level.
pub fn tier_listing(tiers: &[MembershipTier], held: Option<u64>) -> Vec<TierView<'_>> {
    let mut sorted: Vec<&MembershipTier> = tiers.iter().collect();
    sorted.sort_by_key(|tier| tier.tier_level);
    sorted
        .into_iter()
        .map(|tier| TierView {
            tier,
            is_current: held == Some(tier.tier_level),
            grants_access: has_tier_access(Some(tier.tier_level), held),
        })
        .collect()
}

/// Filter a video list by category. `None` keeps every video.
pub fn filter_by_category(videos: &[VideoMetadata], category: Option<Category>) -> Vec<&VideoMetadata> {
    videos
        .iter()
        .filter(|video| category.map_or(true, |c| video.category == c))
        .collect()
}

/// Courses whose video list includes `video_id`.
pub fn courses_containing_video<'a>(courses: &'a [Course], video_id: &str) -> Vec<&'a Course> {
    courses
        .iter()
        .filter(|course| course.video_ids.iter().any(|id| id == video_id))
        .collect()
}

pub fn visible_courses(courses: &[Course]) -> Vec<&Course> {
    courses.iter().filter(|course| course.is_visible).collect()
}

/// True when `identity` is the non-anonymous owner of `channel`.
pub fn is_channel_owner(channel: &Channel, identity: Option<&Identity>) -> bool {
    identity.is_some_and(|identity| !identity.is_anonymous() && identity.principal == channel.principal)
}

/// Summary figures for a channel's analytics view.
///
/// Subscriber counts and recurring revenue are not exposed by the backend,
/// so they are reported as unknown instead of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAnalytics {
    pub total_donations_usd: u64,
    pub donation_count: usize,
    pub tier_count: usize,
    pub recent_donations: Vec<Donation>,
    pub total_subscribers: Option<u64>,
    pub monthly_revenue_usd: Option<u64>,
}

pub fn channel_analytics(donations: &[Donation], tiers: &[MembershipTier]) -> ChannelAnalytics {
    let mut recent = donations.to_vec();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(RECENT_DONATIONS);

    ChannelAnalytics {
        total_donations_usd: donations.iter().map(|d| d.amount_usd).sum(),
        donation_count: donations.len(),
        tier_count: tiers.len(),
        recent_donations: recent,
        total_subscribers: None,
        monthly_revenue_usd: None,
    }
}
