//! Property-Based Tests for Session Consistency
//!
//! For any sequence of login, failed login and logout steps, once each step
//! returns the session is settled, the service handle is bound to exactly
//! the current identity, and the persisted credential matches it.

mod support;

use proptest::prelude::*;
use reelhouse_client::SessionStatus;
use reelhouse_core::Principal;
use reelhouse_test_utils::MockStore;
use support::Harness;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// PROPERTY TEST STRATEGIES
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Login(String),
    FailedLogin,
    CancelledLogin,
    Logout,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => "(alice|bob|carol)".prop_map(Step::Login),
        1 => Just(Step::FailedLogin),
        1 => Just(Step::CancelledLogin),
        2 => Just(Step::Logout),
    ]
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After every step the handle principal, the session identity and the
    /// stored credential agree, and login never replaces an active identity.
    #[test]
    fn prop_handle_tracks_identity(steps in prop::collection::vec(step_strategy(), 1..10)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = Harness::new(MockStore::new());
            prop_assert_eq!(h.client.session().initialize().await, SessionStatus::Unauthenticated);

            let mut expected: Option<Principal> = None;
            for step in &steps {
                let session = h.client.session();
                match step {
                    Step::Login(name) => {
                        if expected.is_none() {
                            h.provider.succeed_as(name);
                            expected = Some(Principal::from_text(name));
                        }
                        session.login().await;
                    }
                    Step::FailedLogin => {
                        if expected.is_none() {
                            h.provider.fail_next("popup blocked");
                        }
                        session.login().await;
                    }
                    Step::CancelledLogin => {
                        if expected.is_none() {
                            h.provider.cancel_next();
                        }
                        session.login().await;
                    }
                    Step::Logout => {
                        session.logout().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                        expected = None;
                    }
                }

                let status = session.status();
                prop_assert_ne!(status, SessionStatus::Initializing);
                prop_assert_eq!(status == SessionStatus::Authenticated, expected.is_some());
                prop_assert_eq!(session.handle().principal(), expected.clone());
                prop_assert_eq!(
                    session.identity().map(|identity| identity.principal),
                    expected.clone()
                );
                prop_assert_eq!(
                    h.stored_identity().map(|identity| identity.principal),
                    expected.clone()
                );
                prop_assert!(session.handle().is_ready());
            }
            Ok(())
        })?;
    }

    /// Every identity change costs exactly one handle build, and the
    /// generation counts them.
    #[test]
    fn prop_one_build_per_identity_change(steps in prop::collection::vec(step_strategy(), 1..10)) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = Harness::new(MockStore::new());
            h.client.session().initialize().await;

            let mut changes = 1usize;
            let mut authenticated = false;
            for step in &steps {
                let session = h.client.session();
                match step {
                    Step::Login(name) if !authenticated => {
                        h.provider.succeed_as(name);
                        session.login().await;
                        authenticated = true;
                        changes += 1;
                    }
                    Step::Logout => {
                        session.logout().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                        if authenticated {
                            changes += 1;
                        }
                        authenticated = false;
                    }
                    _ => {}
                }
            }

            prop_assert_eq!(h.factory.builds(), changes);
            prop_assert_eq!(h.client.session().handle().generation(), changes as u64);
            Ok(())
        })?;
    }
}
