//! Shared fixtures for auth tests.

use std::sync::Arc;
use uuid::Uuid;

use super::challenge::StaticChallengeVerifier;
use super::federated::{FederatedIdentity, StaticIdentityProvider};
use super::rate_limit::NoopRateLimiter;
use super::state::{AuthConfig, AuthState};
use super::storage::{AccountRecord, AccountStatus, AccountStore, MemoryAccountStore, Role};
use super::utils::hash_password;

/// Hash rounds kept low so tests stay fast.
pub(crate) const TEST_HASH_ROUNDS: u32 = 10;

/// Challenge response the static verifier accepts.
pub(crate) const GOOD_RESPONSE: &str = "not-a-robot";

pub(crate) fn identity(subject: &str, email: &str) -> FederatedIdentity {
    FederatedIdentity {
        subject: subject.to_string(),
        email: email.to_string(),
        display_name: "Test User".to_string(),
        photo_url: None,
    }
}

/// Empty wiring: memory store, static verifier, no identities.
pub(crate) fn auth_state() -> Arc<AuthState> {
    auth_state_with(Arc::new(MemoryAccountStore::new()), StaticIdentityProvider::new())
}

pub(crate) fn auth_state_with(
    store: Arc<MemoryAccountStore>,
    provider: StaticIdentityProvider,
) -> Arc<AuthState> {
    let config = AuthConfig::new().with_password_hash_rounds(TEST_HASH_ROUNDS);
    Arc::new(AuthState::new(
        config,
        store as Arc<dyn AccountStore>,
        Arc::new(provider),
        Arc::new(StaticChallengeVerifier::accepting(GOOD_RESPONSE)),
        Arc::new(NoopRateLimiter),
    ))
}

pub(crate) async fn seed_account(
    store: &MemoryAccountStore,
    username: &str,
    password: &str,
    status: AccountStatus,
) -> Uuid {
    let id = Uuid::new_v4();
    let salt = vec![3u8; 16];
    store
        .insert(AccountRecord {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: hash_password(password, &salt, TEST_HASH_ROUNDS),
            salt,
            status,
            role: Role::User,
            provider_subject: None,
            display_name: None,
            photo_url: None,
        })
        .await;
    id
}
