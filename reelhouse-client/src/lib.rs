//! Reelhouse Client - session lifecycle and cached data access
//!
//! Ties an identity provider, a remote service handle and the query cache
//! together behind one [`ReelClient`]:
//!
//! - [`AuthSession`] derives `initializing` / `authenticated` /
//!   `unauthenticated` from the identity adapter and the handle, and clears
//!   cached data on logout.
//! - [`ServiceHandle`] is rebuilt whenever the identity changes; builds that
//!   a newer identity supersedes are discarded.
//! - [`ReelClient`] exposes every backend read as a gated, cached query and
//!   every write as a single call followed by graph-driven invalidation.
//!
//! # Example
//!
//! ```ignore
//! let config = ClientConfig::load()?;
//! init_tracing(&TelemetryConfig::from_env())?;
//!
//! let client = ReelClient::from_config(&config)?;
//! client.session().initialize().await;
//!
//! if let QueryOutcome::Ready(read) = client.get_channel_videos(Some("channel-1")).await? {
//!     println!("{} videos", read.value().len());
//! }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod credentials;
pub mod handle;
pub mod http;
pub mod identity;
pub mod session;
pub mod telemetry;

pub use backend::{Backend, BackendFactory};
pub use client::{ReelClient, WatchOutcome};
pub use config::{CacheConfig, ClientConfig, IdentityConfig, PolicyOverride, CONFIG_ENV_VAR};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use handle::ServiceHandle;
pub use http::{HttpBackend, HttpBackendFactory};
pub use identity::{
    DeviceKeyIdentityProvider, IdentityAdapter, IdentityProvider, IdentityState, LoginStatus,
};
pub use session::{derive_status, AuthSession, SessionInputs, SessionStatus, ViewGate};
pub use telemetry::{init_tracing, TelemetryConfig};

pub use reelhouse_cache::{NotReady, QueryOutcome};
