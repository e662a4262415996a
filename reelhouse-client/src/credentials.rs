//! Storage for the identity that survives restarts.

use chrono::{DateTime, Utc};
use reelhouse_core::{Identity, SessionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persists the caller's identity between runs.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Identity>, SessionError>;

    fn save(&self, identity: &Identity) -> Result<(), SessionError>;

    /// Remove the stored identity. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    identity: Identity,
    saved_at: DateTime<Utc>,
}

fn store_error(err: impl std::fmt::Display) -> SessionError {
    SessionError::CredentialStore {
        reason: err.to_string(),
    }
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Identity>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(store_error)?;
        let stored = serde_json::from_str::<StoredCredential>(&contents).map_err(store_error)?;
        Ok(Some(stored.identity))
    }

    fn save(&self, identity: &Identity) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(store_error)?;
        }
        let stored = StoredCredential {
            identity: identity.clone(),
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored).map_err(store_error)?;
        std::fs::write(&self.path, contents).map_err(store_error)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error(e)),
        }
    }
}

/// In-process store, for tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Identity>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `identity`, as if saved by an earlier run.
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Identity>, SessionError> {
        let slot = self.slot.lock().map_err(|_| store_error("lock poisoned"))?;
        Ok(slot.clone())
    }

    fn save(&self, identity: &Identity) -> Result<(), SessionError> {
        let mut slot = self.slot.lock().map_err(|_| store_error("lock poisoned"))?;
        *slot = Some(identity.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut slot = self.slot.lock().map_err(|_| store_error("lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}
