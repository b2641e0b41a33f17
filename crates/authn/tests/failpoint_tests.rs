#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in token signing.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p apns-token-auth --features failpoints --test failpoint_tests
//! ```

use std::sync::Arc;

use apns_token_auth::{
    ManualClock, SigningError, SigningIdentity, SigningKey, TokenAuthProvider,
    testutil::{TEST_BUNDLE_ID, TEST_KEY_ID, TEST_TEAM_ID, generate_test_key},
};

fn setup_provider() -> (TokenAuthProvider, Arc<ManualClock>) {
    let key = SigningKey::from_secret_key(TEST_KEY_ID, &generate_test_key())
        .expect("failed to load key");
    let identity =
        SigningIdentity::new(TEST_TEAM_ID, TEST_BUNDLE_ID, key).expect("failed to build identity");
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    (TokenAuthProvider::with_clock(identity, clock.clone()), clock)
}

#[test]
fn sign_failpoint_returns_error_and_keeps_previous_token() {
    let scenario = fail::FailScenario::setup();
    let (provider, clock) = setup_provider();

    let previous = provider.generate().expect("generate before fail point");

    fail::cfg("token-before-sign", "return").expect("failed to configure fail point");
    clock.advance(60);

    let result = provider.generate();
    assert!(matches!(result, Err(SigningError::Signature(_))), "got: {result:?}");
    assert_eq!(provider.get().as_deref(), Some(previous.as_str()));

    scenario.teardown();
}

#[test]
fn sign_failpoint_on_first_generate_leaves_cache_empty() {
    let scenario = fail::FailScenario::setup();
    let (provider, _clock) = setup_provider();

    fail::cfg("token-before-sign", "return").expect("failed to configure fail point");

    assert!(provider.generate().is_err());
    assert!(provider.get().is_none());
    assert!(provider.is_stale(), "a provider without a token is stale");

    scenario.teardown();
}

#[test]
fn sign_failpoint_cleared_allows_recovery() {
    let scenario = fail::FailScenario::setup();
    let (provider, _clock) = setup_provider();

    fail::cfg("token-before-sign", "return").expect("failed to configure fail point");
    assert!(provider.refresh_if_stale().is_err());

    fail::remove("token-before-sign");
    let token = provider.refresh_if_stale().expect("refresh after fail point removal");
    assert_eq!(provider.get(), Some(token));

    scenario.teardown();
}

#[test]
fn sign_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let (provider, _clock) = setup_provider();

    // No fail point configured
    let result = provider.generate();
    assert!(result.is_ok(), "signing should succeed without fail point");

    scenario.teardown();
}
