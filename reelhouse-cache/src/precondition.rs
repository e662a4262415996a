//! Preconditions evaluated before a read is scheduled.
//!
//! A read whose preconditions fail is disabled: no fetch is issued and the
//! caller receives a [`NotReady`] reason, distinct from an error and from a
//! pending fetch.

use crate::freshness::CacheRead;
use std::fmt;

/// Why a read was not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotReady {
    /// The remote service handle is missing or being rebuilt.
    HandleNotReady,
    /// The read depends on the caller and nobody is logged in.
    NotAuthenticated,
    /// A required parameter is absent or empty.
    MissingParameter(&'static str),
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReady::HandleNotReady => f.write_str("service handle not ready"),
            NotReady::NotAuthenticated => f.write_str("not authenticated"),
            NotReady::MissingParameter(name) => write!(f, "missing parameter {name}"),
        }
    }
}

/// Outcome of a gated read.
#[derive(Debug, Clone)]
pub enum QueryOutcome<T> {
    NotReady(NotReady),
    Ready(CacheRead<T>),
}

impl<T> QueryOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, QueryOutcome::Ready(_))
    }

    pub fn not_ready_reason(&self) -> Option<NotReady> {
        match self {
            QueryOutcome::NotReady(reason) => Some(*reason),
            QueryOutcome::Ready(_) => None,
        }
    }

    pub fn ready(self) -> Option<CacheRead<T>> {
        match self {
            QueryOutcome::Ready(read) => Some(read),
            QueryOutcome::NotReady(_) => None,
        }
    }

    /// The value, if the read ran.
    pub fn into_value(self) -> Option<T> {
        self.ready().map(CacheRead::into_value)
    }

    pub fn map<U, F>(self, f: F) -> QueryOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            QueryOutcome::Ready(read) => QueryOutcome::Ready(read.map(f)),
            QueryOutcome::NotReady(reason) => QueryOutcome::NotReady(reason),
        }
    }
}

/// Builder for the predicates guarding one read.
///
/// Checked in order: handle readiness, required parameters, authentication.
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    handle_ready: bool,
    requires_auth: bool,
    authenticated: bool,
    missing: Option<&'static str>,
}

impl Preconditions {
    pub fn new(handle_ready: bool) -> Self {
        Self {
            handle_ready,
            ..Self::default()
        }
    }

    /// Require an authenticated caller.
    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.requires_auth = true;
        self.authenticated = authenticated;
        self
    }

    /// Require `value` to be present and non-empty.
    pub fn param(mut self, name: &'static str, value: Option<&str>) -> Self {
        let present = value.is_some_and(|v| !v.is_empty());
        if !present && self.missing.is_none() {
            self.missing = Some(name);
        }
        self
    }

    pub fn check(&self) -> Result<(), NotReady> {
        if !self.handle_ready {
            return Err(NotReady::HandleNotReady);
        }
        if let Some(name) = self.missing {
            return Err(NotReady::MissingParameter(name));
        }
        if self.requires_auth && !self.authenticated {
            return Err(NotReady::NotAuthenticated);
        }
        Ok(())
    }
}
