//! Shared harness for client integration tests.

#![allow(dead_code)]

use reelhouse_cache::{PolicyTable, QueryCache};
use reelhouse_client::{CredentialStore, MemoryCredentialStore, ReelClient, SessionStatus};
use reelhouse_test_utils::{MockBackendFactory, MockIdentityProvider, MockStore};
use std::sync::Arc;
use std::time::Duration;

/// Client wired to mocks, with handles on every collaborator.
pub struct Harness {
    pub store: MockStore,
    pub factory: Arc<MockBackendFactory>,
    pub provider: Arc<MockIdentityProvider>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub client: ReelClient,
}

/// Standard policies with retries that do not slow tests down.
pub fn fast_policies() -> PolicyTable {
    PolicyTable::standard().with_retry_delay(Duration::from_millis(1))
}

impl Harness {
    pub fn new(store: MockStore) -> Self {
        Self::with_credentials(store, MemoryCredentialStore::new())
    }

    pub fn with_credentials(store: MockStore, credentials: MemoryCredentialStore) -> Self {
        let factory = Arc::new(MockBackendFactory::new(store.clone()));
        let provider = Arc::new(MockIdentityProvider::new());
        let credentials = Arc::new(credentials);
        let client = ReelClient::assemble(
            factory.clone(),
            provider.clone(),
            credentials.clone(),
            QueryCache::new(fast_policies()),
        );
        Self {
            store,
            factory,
            provider,
            credentials,
            client,
        }
    }

    /// Initialized and logged in as `principal`.
    pub async fn logged_in(store: MockStore, principal: &str) -> Self {
        let harness = Self::new(store);
        assert_eq!(
            harness.client.session().initialize().await,
            SessionStatus::Unauthenticated
        );
        harness.provider.succeed_as(principal);
        assert_eq!(
            harness.client.session().login().await,
            SessionStatus::Authenticated
        );
        harness
    }

    pub fn stored_identity(&self) -> Option<reelhouse_core::Identity> {
        self.credentials.load().ok().flatten()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached within 5s");
}
