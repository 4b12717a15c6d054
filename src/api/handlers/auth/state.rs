//! Auth configuration and shared state for the login boundary.

use std::sync::Arc;
use std::time::Duration;

use super::challenge::{ChallengeGate, ChallengeVerifier};
use super::credentials::CredentialVerifier;
use super::federated::{FederatedLoginCoordinator, IdentityProvider};
use super::provisioning::ProvisioningPrompt;
use super::rate_limit::RateLimiter;
use super::session::SessionIssuer;
use super::signal::SessionSignalChannel;
use super::storage::AccountStore;

const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 2 * 60;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;
const DEFAULT_PASSWORD_HASH_ROUNDS: u32 = 100_000;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    challenge_ttl_seconds: u64,
    session_ttl_seconds: u64,
    password_hash_rounds: u32,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            password_hash_rounds: DEFAULT_PASSWORD_HASH_ROUNDS,
        }
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: u64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_hash_rounds(mut self, rounds: u32) -> Self {
        self.password_hash_rounds = rounds;
        self
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_seconds)
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    #[must_use]
    pub fn password_hash_rounds(&self) -> u32 {
        self.password_hash_rounds
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a login attempt needs, wired once at startup.
pub struct AuthState {
    config: AuthConfig,
    accounts: Arc<dyn AccountStore>,
    gate: ChallengeGate,
    issuer: SessionIssuer,
    signals: Arc<SessionSignalChannel>,
    prompt: Arc<ProvisioningPrompt>,
    provider: Arc<dyn IdentityProvider>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        accounts: Arc<dyn AccountStore>,
        provider: Arc<dyn IdentityProvider>,
        challenge_verifier: Arc<dyn ChallengeVerifier>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let signals = Arc::new(SessionSignalChannel::new());
        let gate = ChallengeGate::new(config.challenge_ttl(), challenge_verifier);
        let issuer = SessionIssuer::new(config.session_ttl(), signals.clone());
        Self {
            config,
            accounts,
            gate,
            issuer,
            signals,
            prompt: Arc::new(ProvisioningPrompt::new()),
            provider,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn gate(&self) -> &ChallengeGate {
        &self.gate
    }

    #[must_use]
    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn signals(&self) -> &SessionSignalChannel {
        &self.signals
    }

    #[must_use]
    pub fn prompt(&self) -> &Arc<ProvisioningPrompt> {
        &self.prompt
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    /// Stateless verifier over the wired account store.
    #[must_use]
    pub fn credential_verifier(&self) -> CredentialVerifier {
        CredentialVerifier::new(self.accounts.clone(), self.config.password_hash_rounds())
    }

    /// Coordinator over the wired provider, store, and prompt.
    #[must_use]
    pub fn coordinator(&self) -> FederatedLoginCoordinator {
        FederatedLoginCoordinator::new(
            self.provider.clone(),
            self.accounts.clone(),
            self.prompt.clone(),
            self.config.password_hash_rounds(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AuthConfig, DEFAULT_CHALLENGE_TTL_SECONDS, DEFAULT_PASSWORD_HASH_ROUNDS,
        DEFAULT_SESSION_TTL_SECONDS,
    };
    use std::time::Duration;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(
            config.challenge_ttl(),
            Duration::from_secs(DEFAULT_CHALLENGE_TTL_SECONDS)
        );
        assert_eq!(
            config.session_ttl(),
            Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS)
        );
        assert_eq!(config.password_hash_rounds(), DEFAULT_PASSWORD_HASH_ROUNDS);

        let config = config
            .with_challenge_ttl_seconds(30)
            .with_session_ttl_seconds(60)
            .with_password_hash_rounds(10);
        assert_eq!(config.challenge_ttl(), Duration::from_secs(30));
        assert_eq!(config.session_ttl(), Duration::from_secs(60));
        assert_eq!(config.password_hash_rounds(), 10);
    }
}
