//! Identity provider adapter.
//!
//! Wraps an interactive login flow behind [`IdentityProvider`] and keeps the
//! current identity, login status and initialization flag in one watchable
//! [`IdentityState`]. Login failures never escape [`IdentityAdapter::login`];
//! they leave the caller unauthenticated and are visible only through the
//! resulting [`LoginStatus`].

use crate::credentials::CredentialStore;
use async_trait::async_trait;
use rand::RngCore;
use reelhouse_core::{now_nanos, Identity, Principal, SessionError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default lifetime of a delegation issued by [`DeviceKeyIdentityProvider`].
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// External login flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the interactive login and return the resulting identity.
    async fn authenticate(&self) -> Result<Identity, SessionError>;

    /// Re-validate an identity loaded from the credential store at startup.
    ///
    /// `Ok(None)` means the stored identity is no longer usable.
    async fn restore(&self, stored: Identity) -> Result<Option<Identity>, SessionError> {
        Ok(Some(stored))
    }
}

/// Provider that authenticates with a freshly generated device key.
///
/// Each login derives a new self-authenticating principal and issues a
/// delegation that expires after the configured TTL.
#[derive(Debug, Clone)]
pub struct DeviceKeyIdentityProvider {
    session_ttl: Duration,
}

impl Default for DeviceKeyIdentityProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl DeviceKeyIdentityProvider {
    pub fn new(session_ttl: Duration) -> Self {
        Self { session_ttl }
    }
}

#[async_trait]
impl IdentityProvider for DeviceKeyIdentityProvider {
    async fn authenticate(&self) -> Result<Identity, SessionError> {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        let principal = Principal::from_public_key(&key);
        let ttl = u64::try_from(self.session_ttl.as_nanos()).unwrap_or(u64::MAX);
        Ok(Identity::with_expiry(
            principal,
            now_nanos().saturating_add(ttl),
        ))
    }
}

/// Progress of the interactive login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginStatus {
    Idle,
    LoggingIn,
    Success,
    LoginError,
}

impl LoginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStatus::Idle => "idle",
            LoginStatus::LoggingIn => "logging-in",
            LoginStatus::Success => "success",
            LoginStatus::LoginError => "login-error",
        }
    }
}

/// Snapshot of the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    /// Current identity; never anonymous.
    pub identity: Option<Identity>,
    pub login_status: LoginStatus,
    /// True until [`IdentityAdapter::initialize`] has finished.
    pub is_initializing: bool,
    /// Why the last login did not succeed.
    pub login_error: Option<SessionError>,
}

impl IdentityState {
    fn initial() -> Self {
        Self {
            identity: None,
            login_status: LoginStatus::Idle,
            is_initializing: true,
            login_error: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| !identity.is_anonymous())
    }
}

/// Proof that a login was started in a given epoch.
///
/// [`IdentityAdapter::clear`] advances the epoch, so a login that was
/// running when the adapter was cleared cannot install its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoginTicket {
    epoch: u64,
}

pub struct IdentityAdapter {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<IdentityState>,
    epoch: AtomicU64,
}

impl std::fmt::Debug for IdentityAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAdapter")
            .field("state", &*self.state.borrow())
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl IdentityAdapter {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(IdentityState::initial());
        Self {
            provider,
            store,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> IdentityState {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn is_initializing(&self) -> bool {
        self.state.borrow().is_initializing
    }

    pub fn login_status(&self) -> LoginStatus {
        self.state.borrow().login_status
    }

    /// Restore a stored identity, if any, and finish initialization.
    ///
    /// Expired or rejected identities are discarded and removed from the
    /// store. Store failures leave the caller unauthenticated.
    pub async fn initialize(&self) -> Option<Identity> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let restored = match self.store.load() {
            Ok(Some(stored)) => self.restore(stored).await,
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load stored identity");
                None
            }
        };

        let restored = if self.epoch.load(Ordering::SeqCst) == epoch {
            restored
        } else {
            None
        };

        self.state.send_modify(|state| {
            if restored.is_some() && state.identity.is_none() {
                state.identity = restored.clone();
            }
            state.is_initializing = false;
        });

        let identity = self.identity();
        tracing::info!(
            principal = ?identity.as_ref().map(|id| id.principal.as_str()),
            "Identity adapter initialized"
        );
        identity
    }

    async fn restore(&self, stored: Identity) -> Option<Identity> {
        if stored.is_anonymous() || stored.is_expired_at(now_nanos()) {
            tracing::info!(principal = %stored.principal, "Discarding expired stored identity");
            self.forget_stored();
            return None;
        }
        match self.provider.restore(stored).await {
            Ok(Some(identity)) if !identity.is_anonymous() => Some(identity),
            Ok(_) => {
                self.forget_stored();
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity provider rejected stored identity");
                self.forget_stored();
                None
            }
        }
    }

    fn forget_stored(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to remove stored identity");
        }
    }

    /// Run the interactive login.
    ///
    /// Does nothing while another login is in progress or when already
    /// authenticated. The outcome is reported through the returned status
    /// and the watch channel, never as an error.
    pub async fn login(&self) -> LoginStatus {
        let Some(ticket) = self.begin_login() else {
            return self.login_status();
        };
        let result = self.provider.authenticate().await;
        self.finish_login(ticket, result)
    }

    pub(crate) fn begin_login(&self) -> Option<LoginTicket> {
        let mut ticket = None;
        self.state.send_if_modified(|state| {
            if state.login_status == LoginStatus::LoggingIn || state.is_authenticated() {
                return false;
            }
            state.login_status = LoginStatus::LoggingIn;
            state.login_error = None;
            ticket = Some(LoginTicket {
                epoch: self.epoch.load(Ordering::SeqCst),
            });
            true
        });
        if ticket.is_some() {
            tracing::info!("Login started");
        }
        ticket
    }

    pub(crate) fn finish_login(
        &self,
        ticket: LoginTicket,
        result: Result<Identity, SessionError>,
    ) -> LoginStatus {
        if self.epoch.load(Ordering::SeqCst) != ticket.epoch {
            tracing::info!("Discarding login that finished after the identity was cleared");
            return self.login_status();
        }

        let result = result.and_then(|identity| {
            if identity.is_anonymous() {
                Err(SessionError::LoginFailed {
                    reason: "provider returned the anonymous identity".to_string(),
                })
            } else {
                Ok(identity)
            }
        });

        match result {
            Ok(identity) => {
                if let Err(e) = self.store.save(&identity) {
                    tracing::warn!(error = %e, "Failed to persist identity; session will not survive restart");
                }
                tracing::info!(principal = %identity.principal, "Login succeeded");
                self.state.send_modify(|state| {
                    state.identity = Some(identity);
                    state.login_status = LoginStatus::Success;
                    state.login_error = None;
                });
                LoginStatus::Success
            }
            Err(e) => {
                tracing::info!(error = %e, "Login did not complete");
                self.state.send_modify(|state| {
                    state.identity = None;
                    state.login_status = LoginStatus::LoginError;
                    state.login_error = Some(e);
                });
                LoginStatus::LoginError
            }
        }
    }

    /// Log out: drop the identity and remove the stored credential.
    ///
    /// The in-memory state is cleared even when the store fails.
    pub fn clear(&self) -> Result<(), SessionError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.identity = None;
            state.login_status = LoginStatus::Idle;
            state.login_error = None;
        });
        tracing::info!("Identity cleared");
        self.store.clear()
    }

    pub(crate) fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }
}
