//! Remote service handle.
//!
//! Holds the one current [`Backend`], bound to the identity it was built
//! for. Rebuilding bumps a generation counter; a build that finishes after a
//! newer rebuild has started is discarded, so no caller can obtain a backend
//! bound to a previous identity once the newer build completes.

use crate::backend::{Backend, BackendFactory};
use reelhouse_core::{Identity, Principal, ReelError, ReelResult, SessionError, Time};
use std::sync::{Arc, Mutex, MutexGuard};

/// What a backend is bound to. Identities compare by principal and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    principal: Option<Principal>,
    expires_at: Option<Time>,
}

impl Binding {
    fn of(identity: Option<&Identity>) -> Self {
        match identity.filter(|identity| !identity.is_anonymous()) {
            Some(identity) => Self {
                principal: Some(identity.principal.clone()),
                expires_at: identity.expires_at,
            },
            None => Self {
                principal: None,
                expires_at: None,
            },
        }
    }
}

struct HandleState {
    current: Option<Arc<dyn Backend>>,
    /// Binding of `current`, of the build in progress, or of the last failed build.
    binding: Option<Binding>,
    generation: u64,
    fetching: bool,
    /// At least one build attempt has finished.
    resolved: bool,
    last_error: Option<ReelError>,
}

/// A rebuild that has been started but not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingBuild {
    generation: u64,
}

#[derive(Clone)]
pub struct ServiceHandle {
    factory: Arc<dyn BackendFactory>,
    state: Arc<Mutex<HandleState>>,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("generation", &self.generation())
            .field("is_fetching", &self.is_fetching())
            .finish_non_exhaustive()
    }
}

impl ServiceHandle {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            state: Arc::new(Mutex::new(HandleState {
                current: None,
                binding: None,
                generation: 0,
                fetching: false,
                resolved: false,
                last_error: None,
            })),
        }
    }

    // State is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The current backend.
    ///
    /// Fails with [`SessionError::HandleNotReady`] before the first build
    /// completes, while a rebuild is in progress, and after a failed build.
    pub fn current(&self) -> Result<Arc<dyn Backend>, SessionError> {
        let state = self.lock();
        if state.fetching {
            return Err(SessionError::HandleNotReady);
        }
        state.current.clone().ok_or(SessionError::HandleNotReady)
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_ok()
    }

    /// True while a (re)build is in progress.
    pub fn is_fetching(&self) -> bool {
        self.lock().fetching
    }

    /// True once at least one build has finished, successfully or not.
    pub fn is_resolved(&self) -> bool {
        self.lock().resolved
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Principal of the latest binding; `None` when anonymous or unbuilt.
    ///
    /// After a failed build this is the principal the build was for.
    pub fn principal(&self) -> Option<Principal> {
        self.lock()
            .binding
            .as_ref()
            .and_then(|binding| binding.principal.clone())
    }

    /// True when the latest binding, built or in progress, is for `identity`.
    pub fn is_bound_to(&self, identity: Option<&Identity>) -> bool {
        self.lock().binding.as_ref() == Some(&Binding::of(identity))
    }

    /// The current backend, provided it was built for `identity`.
    ///
    /// Fails with [`SessionError::HandleNotReady`] in the same cases as
    /// [`current`](Self::current), and while the handle is still bound to a
    /// different identity.
    pub fn current_for(&self, identity: Option<&Identity>) -> Result<Arc<dyn Backend>, SessionError> {
        let state = self.lock();
        if state.fetching || state.binding.as_ref() != Some(&Binding::of(identity)) {
            return Err(SessionError::HandleNotReady);
        }
        state.current.clone().ok_or(SessionError::HandleNotReady)
    }

    /// Error from the most recent failed build.
    pub fn last_error(&self) -> Option<ReelError> {
        self.lock().last_error.clone()
    }

    /// Rebuild for `identity` unless a live backend is already bound to it.
    ///
    /// A handle whose last build failed has no live backend, so calling this
    /// again for the same identity retries the build. Returns `Ok(true)` when
    /// a new backend was installed and `Ok(false)` when nothing changed or
    /// the build was superseded.
    pub async fn rebuild(&self, identity: Option<&Identity>) -> ReelResult<bool> {
        match self.begin(identity) {
            Some(pending) => self.finish(pending, identity).await,
            None => Ok(false),
        }
    }

    /// Mark a rebuild as started. `None` if a live backend is already bound
    /// to `identity`.
    pub(crate) fn begin(&self, identity: Option<&Identity>) -> Option<PendingBuild> {
        let binding = Binding::of(identity);
        let mut state = self.lock();
        let settled = !state.fetching && state.current.is_some();
        if settled && state.binding.as_ref() == Some(&binding) {
            return None;
        }

        state.generation += 1;
        state.fetching = true;
        state.current = None;
        state.binding = Some(binding);
        tracing::info!(generation = state.generation, "Rebuilding service handle");
        Some(PendingBuild {
            generation: state.generation,
        })
    }

    pub(crate) async fn finish(
        &self,
        pending: PendingBuild,
        identity: Option<&Identity>,
    ) -> ReelResult<bool> {
        let built = self.factory.build(identity).await;

        let mut state = self.lock();
        if state.generation != pending.generation {
            tracing::debug!(
                stale = pending.generation,
                current = state.generation,
                "Discarding superseded service handle build"
            );
            return Ok(false);
        }

        state.fetching = false;
        state.resolved = true;
        match built {
            Ok(backend) => {
                state.current = Some(backend);
                state.last_error = None;
                tracing::info!(generation = state.generation, "Service handle ready");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(generation = state.generation, error = %e, "Service handle build failed");
                state.current = None;
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }
}
