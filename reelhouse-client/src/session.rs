//! Auth session state machine.
//!
//! [`AuthSession`] is the single source of truth for whether the caller is
//! logged in. It owns the identity adapter and the service handle, derives a
//! tri-state [`SessionStatus`] from them with the pure [`derive_status`], and
//! publishes every change on a watch channel.
//!
//! ```text
//! initializing ──► authenticated ◄──► unauthenticated
//!        └──────────────────────────────────►┘
//! ```
//!
//! Status is `Initializing` while the adapter is initializing, while the
//! handle is building, has never finished a build or is still bound to a
//! different identity, and while an interactive login is running.

use crate::handle::ServiceHandle;
use crate::identity::{IdentityAdapter, IdentityState, LoginStatus};
use reelhouse_cache::QueryCache;
use crate::backend::Backend;
use reelhouse_core::{Identity, ReelResult, SessionError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Initializing,
    Authenticated,
    Unauthenticated,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the session status depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInputs {
    pub identity: Option<Identity>,
    pub adapter_initializing: bool,
    pub login_in_progress: bool,
    pub handle_fetching: bool,
    /// The handle has finished at least one build.
    pub handle_resolved: bool,
    /// The handle's latest binding is for `identity`.
    pub handle_bound_to_identity: bool,
}

impl SessionInputs {
    fn gather(identity: &IdentityState, handle: &ServiceHandle) -> Self {
        Self {
            identity: identity.identity.clone(),
            adapter_initializing: identity.is_initializing,
            login_in_progress: identity.login_status == LoginStatus::LoggingIn,
            handle_fetching: handle.is_fetching(),
            handle_resolved: handle.is_resolved(),
            handle_bound_to_identity: handle.is_bound_to(identity.identity.as_ref()),
        }
    }
}

/// Derive the session status from its inputs.
pub fn derive_status(inputs: &SessionInputs) -> SessionStatus {
    if inputs.adapter_initializing
        || inputs.handle_fetching
        || !inputs.handle_resolved
        || !inputs.handle_bound_to_identity
        || inputs.login_in_progress
    {
        return SessionStatus::Initializing;
    }
    match &inputs.identity {
        Some(identity) if !identity.is_anonymous() => SessionStatus::Authenticated,
        _ => SessionStatus::Unauthenticated,
    }
}

/// What a protected view should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewGate {
    /// Show a loading affordance; the session is still initializing.
    Loading,
    /// Navigate away to the contained path.
    Redirect(String),
    Render,
}

impl ViewGate {
    /// Where unauthenticated callers are sent unless a view says otherwise.
    pub const DEFAULT_REDIRECT: &'static str = "/";

    pub fn for_status(status: SessionStatus) -> Self {
        Self::for_status_with_redirect(status, Self::DEFAULT_REDIRECT)
    }

    pub fn for_status_with_redirect(status: SessionStatus, redirect_to: &str) -> Self {
        match status {
            SessionStatus::Initializing => ViewGate::Loading,
            SessionStatus::Unauthenticated => ViewGate::Redirect(redirect_to.to_string()),
            SessionStatus::Authenticated => ViewGate::Render,
        }
    }
}

struct SessionInner {
    adapter: IdentityAdapter,
    handle: ServiceHandle,
    cache: QueryCache,
    status: watch::Sender<SessionStatus>,
}

/// Explicitly constructed session object, cheap to clone.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("status", &self.status())
            .field("adapter", &self.inner.adapter)
            .field("handle", &self.inner.handle)
            .finish()
    }
}

impl AuthSession {
    pub fn new(adapter: IdentityAdapter, handle: ServiceHandle, cache: QueryCache) -> Self {
        let initial = derive_status(&SessionInputs::gather(&adapter.snapshot(), &handle));
        let (status, _) = watch::channel(initial);
        Self {
            inner: Arc::new(SessionInner {
                adapter,
                handle,
                cache,
                status,
            }),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn inputs(&self) -> SessionInputs {
        SessionInputs::gather(&self.inner.adapter.snapshot(), &self.inner.handle)
    }

    /// True when an identity is present and not anonymous.
    pub fn is_authenticated(&self) -> bool {
        self.inner.adapter.snapshot().is_authenticated()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.adapter.identity()
    }

    /// The backend bound to the current identity.
    ///
    /// Fails with [`SessionError::HandleNotReady`] while the handle is
    /// building, after a failed build, and between an identity change and
    /// the start of the rebuild it triggers.
    pub fn backend(&self) -> Result<Arc<dyn Backend>, SessionError> {
        self.inner.handle.current_for(self.identity().as_ref())
    }

    pub fn is_backend_ready(&self) -> bool {
        self.backend().is_ok()
    }

    pub fn handle(&self) -> &ServiceHandle {
        &self.inner.handle
    }

    pub fn adapter(&self) -> &IdentityAdapter {
        &self.inner.adapter
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn gate(&self) -> ViewGate {
        ViewGate::for_status(self.status())
    }

    pub fn gate_with_redirect(&self, redirect_to: &str) -> ViewGate {
        ViewGate::for_status_with_redirect(self.status(), redirect_to)
    }

    fn publish(&self) -> SessionStatus {
        let next = derive_status(&self.inputs());
        self.inner.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::info!(from = %current, to = %next, "Session status changed");
            *current = next;
            true
        });
        next
    }

    /// Bind the handle to the adapter's current identity.
    ///
    /// Every identity change goes through here, and the rebuild is marked as
    /// started before the new status is published.
    async fn sync_handle(&self) {
        let identity = self.inner.adapter.identity();
        let pending = self.inner.handle.begin(identity.as_ref());
        self.publish();
        if let Some(pending) = pending {
            if let Err(e) = self.inner.handle.finish(pending, identity.as_ref()).await {
                tracing::warn!(error = %e, "Session continues without a service handle");
            }
            self.publish();
        }
    }

    /// Restore any stored identity and build the first handle.
    pub async fn initialize(&self) -> SessionStatus {
        self.inner.adapter.initialize().await;
        self.sync_handle().await;
        self.status()
    }

    /// Run the interactive login and rebind the handle on success.
    ///
    /// A failed or cancelled login leaves the session unauthenticated; it is
    /// not reported as an error. Calling this while already authenticated or
    /// while a login is running does nothing.
    pub async fn login(&self) -> SessionStatus {
        let Some(ticket) = self.inner.adapter.begin_login() else {
            return self.status();
        };
        self.publish();

        let result = self.inner.adapter.provider().authenticate().await;
        self.inner.adapter.finish_login(ticket, result);
        self.sync_handle().await;
        self.status()
    }

    /// Clear the identity, drop cached data and rebind anonymously.
    ///
    /// Teardown always completes; a credential store or cache failure is
    /// reported afterwards.
    pub async fn logout(&self) -> ReelResult<()> {
        let cleared = self.inner.adapter.clear();
        let dropped = self.inner.cache.clear();
        if let Ok(count) = &dropped {
            tracing::info!(entries = count, "Cleared query cache on logout");
        }

        self.sync_handle().await;
        cleared?;
        dropped?;
        Ok(())
    }

    /// Wait until the status leaves `Initializing`.
    pub async fn wait_until_settled(&self) -> SessionStatus {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|status| *status != SessionStatus::Initializing).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        };
        settled
    }
}
