use crate::api;
use crate::api::handlers::auth::{
    AccountStore, AuthConfig, AuthState, ChallengeVerifier, HttpChallengeVerifier,
    HttpIdentityProvider, IdentityProvider, MemoryAccountStore, NoopRateLimiter, PgAccountStore,
    StaticChallengeVerifier, StaticIdentityProvider,
};
use crate::cli::actions::Action;
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::warn;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            identity_url,
            challenge_url,
        } => {
            let accounts: Arc<dyn AccountStore> = match dsn {
                Some(dsn) => {
                    let pool = PgPoolOptions::new()
                        .min_connections(1)
                        .max_connections(5)
                        .max_lifetime(Duration::from_secs(60 * 2))
                        .test_before_acquire(true)
                        .connect(&dsn)
                        .await
                        .context("Failed to connect to database")?;
                    Arc::new(PgAccountStore::new(pool))
                }
                None => {
                    warn!("No DSN configured, accounts live in memory only");
                    Arc::new(MemoryAccountStore::new())
                }
            };

            let provider: Arc<dyn IdentityProvider> = match identity_url {
                Some(identity_url) => {
                    let parsed = Url::parse(&identity_url)
                        .with_context(|| format!("Invalid identity URL: {identity_url}"))?;
                    Arc::new(HttpIdentityProvider::new(parsed.to_string())?)
                }
                None => {
                    warn!("No identity provider configured, federated login is disabled");
                    Arc::new(StaticIdentityProvider::new())
                }
            };

            let challenge_verifier: Arc<dyn ChallengeVerifier> = match challenge_url {
                Some(challenge_url) => {
                    let parsed = Url::parse(&challenge_url)
                        .with_context(|| format!("Invalid challenge URL: {challenge_url}"))?;
                    Arc::new(HttpChallengeVerifier::new(parsed.to_string())?)
                }
                None => {
                    warn!("No challenge service configured, accepting every response");
                    Arc::new(StaticChallengeVerifier::accept_all())
                }
            };

            let auth_state = Arc::new(AuthState::new(
                AuthConfig::new(),
                accounts,
                provider,
                challenge_verifier,
                Arc::new(NoopRateLimiter),
            ));

            api::new(port, auth_state).await?;
        }
    }

    Ok(())
}
