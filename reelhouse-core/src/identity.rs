//! Identity types for Reelhouse callers

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Timestamp in nanoseconds since the Unix epoch, as stored by the backend.
pub type Time = u64;

/// Textual form of the anonymous principal.
pub const ANONYMOUS_PRINCIPAL: &str = "2vxsx-fae";

/// Length of the random suffix in generated record ids.
const RECORD_ID_SUFFIX_LEN: usize = 9;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque unique identifier for an entity known to the identity system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap a principal in its textual form.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The principal used by callers that have not logged in.
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_PRINCIPAL.to_string())
    }

    /// Derive a self-authenticating principal from public key material.
    pub fn from_public_key(key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key);
        let digest = hasher.finalize();
        let encoded = hex::encode(&digest[..20]);
        let groups: Vec<&str> = encoded
            .as_bytes()
            .chunks(5)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        Self(groups.join("-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_PRINCIPAL
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential bound to a principal, issued by the identity provider.
///
/// An identity whose principal is anonymous is treated exactly like having
/// no identity at all when deciding whether a caller is logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub principal: Principal,
    /// Expiry of the delegation backing this identity, if it has one.
    pub expires_at: Option<Time>,
}

impl Identity {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            expires_at: None,
        }
    }

    pub fn with_expiry(principal: Principal, expires_at: Time) -> Self {
        Self {
            principal,
            expires_at: Some(expires_at),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(Principal::anonymous())
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_anonymous()
    }

    /// Check whether the delegation has expired as of `now`.
    pub fn is_expired_at(&self, now: Time) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }
}

/// Current time in backend nanoseconds.
pub fn now_nanos() -> Time {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|nanos| nanos.max(0) as u64)
        .unwrap_or(0)
}

/// Generate a client-side id for a new record, e.g. `video-1718000000000-k3j9x0a1b`.
pub fn new_record_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..RECORD_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert!(identity.is_anonymous());
        assert_eq!(identity.principal.as_str(), ANONYMOUS_PRINCIPAL);
    }

    #[test]
    fn test_derived_principal_is_stable_and_not_anonymous() {
        let a = Principal::from_public_key(b"alice-key");
        let b = Principal::from_public_key(b"alice-key");
        let c = Principal::from_public_key(b"bob-key");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_anonymous());
        assert_eq!(a.as_str().split('-').count(), 8);
    }

    #[test]
    fn test_identity_expiry() {
        let identity = Identity::with_expiry(Principal::from_text("abc"), 100);
        assert!(!identity.is_expired_at(99));
        assert!(identity.is_expired_at(100));
        assert!(!Identity::new(Principal::from_text("abc")).is_expired_at(u64::MAX));
    }

    #[test]
    fn test_new_record_id_shape() {
        let id = new_record_id("video");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "video");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), RECORD_ID_SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }
}
