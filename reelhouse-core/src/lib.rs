//! Reelhouse Core - Domain Types
//!
//! Records exchanged with the backend service, identity types, the error
//! taxonomy shared by every crate, and the handful of pure helpers the
//! client needs (tier access, filtering, playlist sequencing).
//!
//! No I/O lives here. All other crates depend on this one.

pub mod access;
pub mod entities;
pub mod error;
pub mod identity;
pub mod payment;
pub mod playlist;

pub use access::{
    channel_analytics, courses_containing_video, filter_by_category, has_tier_access,
    is_channel_owner, tier_listing, visible_courses, ChannelAnalytics, TierView,
};
pub use entities::*;
pub use error::{
    CacheError, ConfigError, ReelError, ReelResult, RemoteError, SessionError, ValidationError,
};
pub use identity::{new_record_id, now_nanos, Identity, Principal, Time, ANONYMOUS_PRINCIPAL};
pub use payment::{PaymentKind, PaymentRedirect, PaymentUrls};
pub use playlist::PlaylistCursor;

/// Channel identifier as issued by the backend.
pub type ChannelId = String;

/// Video identifier as issued by the backend.
pub type VideoId = String;
