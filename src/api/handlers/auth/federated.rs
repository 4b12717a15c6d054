//! Federated login: provider token exchange and first-use provisioning.

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};
use uuid::Uuid;

use super::error::AuthError;
use super::provisioning::ProvisioningPrompt;
use super::storage::{AccountRef, AccountStatus, AccountStore};
use super::utils::{generate_salt, hash_password, valid_email};

/// Identity asserted by the external provider; immutable per attempt.
#[derive(Clone, Debug, Deserialize)]
pub struct FederatedIdentity {
    pub subject: String,
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

/// Exchanges a provider token for the identity behind it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_token(&self, provider_token: &str) -> Result<FederatedIdentity>;
}

/// Remote identity-federation provider.
///
/// POSTs `{token}` to `{base_url}/exchange` and deserializes the identity
/// from the JSON body.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_token(&self, provider_token: &str) -> Result<FederatedIdentity> {
        let body = json!({ "token": provider_token });
        let response = self
            .client
            .post(format!("{}/exchange", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("provider rejected token exchange: {}", response.status());
        }
        let identity = response.json::<FederatedIdentity>().await?;
        Ok(identity)
    }
}

/// Fixed token → identity mapping for tests and dsn-less development.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    identities: HashMap<String, FederatedIdentity>,
}

impl StaticIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_identity(mut self, provider_token: &str, identity: FederatedIdentity) -> Self {
        self.identities.insert(provider_token.to_string(), identity);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn exchange_token(&self, provider_token: &str) -> Result<FederatedIdentity> {
        match self.identities.get(provider_token) {
            Some(identity) => Ok(identity.clone()),
            None => bail!("unknown provider token"),
        }
    }
}

/// The outcome of starting a federated authentication.
pub enum FederatedAuth {
    /// A matching active account exists.
    Existing(AccountRef),
    /// No local account yet; the attempt is suspended on provisioning.
    Provisioning(ProvisioningTicket),
}

/// A suspended coordinator invocation waiting for its prompt resolution.
pub struct ProvisioningTicket {
    pub request_id: Uuid,
    identity: FederatedIdentity,
    receiver: oneshot::Receiver<Option<SecretString>>,
}

/// Exchanges provider identity for a local account, provisioning on first use.
pub struct FederatedLoginCoordinator {
    provider: Arc<dyn IdentityProvider>,
    accounts: Arc<dyn AccountStore>,
    prompt: Arc<ProvisioningPrompt>,
    hash_rounds: u32,
}

impl FederatedLoginCoordinator {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        accounts: Arc<dyn AccountStore>,
        prompt: Arc<ProvisioningPrompt>,
        hash_rounds: u32,
    ) -> Self {
        Self {
            provider,
            accounts,
            prompt,
            hash_rounds,
        }
    }

    /// Full federated authentication: begin, and when provisioning is needed,
    /// suspend until the prompt resolves.
    pub async fn authenticate(&self, provider_token: &str) -> Result<AccountRef, AuthError> {
        match self.begin(provider_token).await? {
            FederatedAuth::Existing(account) => Ok(account),
            FederatedAuth::Provisioning(ticket) => self.complete(ticket).await,
        }
    }

    /// Exchange the token and look up the local account.
    ///
    /// Locked or deleted accounts fail here; provisioning is never invoked
    /// for them.
    pub async fn begin(&self, provider_token: &str) -> Result<FederatedAuth, AuthError> {
        let identity = match self.provider.exchange_token(provider_token).await {
            Ok(identity) => identity,
            Err(err) => {
                error!("Provider token exchange failed: {err:#}");
                return Err(AuthError::ProviderExchangeFailed);
            }
        };
        // A provider asserting a malformed email is as useless as a failed
        // exchange; never let it reach account creation.
        if !valid_email(&identity.email) {
            error!(subject = %identity.subject, "provider returned a malformed email");
            return Err(AuthError::ProviderExchangeFailed);
        }

        let existing = self
            .accounts
            .lookup_federated(&identity.subject, &identity.email)
            .await?;
        match existing {
            Some(record) => match record.status {
                AccountStatus::Active => Ok(FederatedAuth::Existing(record.account_ref())),
                AccountStatus::Locked => Err(AuthError::AccountLocked),
                AccountStatus::Deleted => Err(AuthError::AccountDeleted),
            },
            None => {
                // One outstanding request per invocation: this is the only
                // open() this attempt performs, and complete() consumes it.
                let (request_id, receiver) = self.prompt.open(identity.clone()).await;
                debug!(%request_id, email = %identity.email, "provisioning required");
                Ok(FederatedAuth::Provisioning(ProvisioningTicket {
                    request_id,
                    identity,
                    receiver,
                }))
            }
        }
    }

    /// Suspend on the prompt resolution and create the account.
    ///
    /// Cancellation (or a dropped resolver) aborts with no partial writes.
    pub async fn complete(&self, ticket: ProvisioningTicket) -> Result<AccountRef, AuthError> {
        let outcome = ticket.receiver.await.ok().flatten();
        let Some(password) = outcome else {
            debug!(request_id = %ticket.request_id, "provisioning cancelled");
            return Err(AuthError::ProvisioningAborted);
        };

        let salt = generate_salt()?;
        let password_hash = hash_password(password.expose_secret(), &salt, self.hash_rounds);
        let account = self
            .accounts
            .create_federated(&ticket.identity, &password_hash, &salt)
            .await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FederatedAuth, FederatedIdentity, FederatedLoginCoordinator, IdentityProvider,
        StaticIdentityProvider,
    };
    use crate::api::handlers::auth::error::AuthError;
    use crate::api::handlers::auth::provisioning::ProvisioningPrompt;
    use crate::api::handlers::auth::storage::{
        AccountStatus, AccountStore, MemoryAccountStore,
    };
    use anyhow::Result;
    use secrecy::SecretString;
    use std::sync::Arc;

    fn identity() -> FederatedIdentity {
        FederatedIdentity {
            subject: "subject-1".to_string(),
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            photo_url: Some("https://example.com/alice.png".to_string()),
        }
    }

    fn coordinator(
        store: &Arc<MemoryAccountStore>,
        prompt: &Arc<ProvisioningPrompt>,
    ) -> FederatedLoginCoordinator {
        let provider = StaticIdentityProvider::new().with_identity("good-token", identity());
        FederatedLoginCoordinator::new(
            Arc::new(provider),
            store.clone() as Arc<dyn AccountStore>,
            prompt.clone(),
            10,
        )
    }

    #[tokio::test]
    async fn unknown_provider_token_fails_exchange() {
        let store = Arc::new(MemoryAccountStore::new());
        let prompt = Arc::new(ProvisioningPrompt::new());
        let coordinator = coordinator(&store, &prompt);

        let result = coordinator.authenticate("bad-token").await;
        assert!(matches!(result, Err(AuthError::ProviderExchangeFailed)));
    }

    #[tokio::test]
    async fn existing_active_account_skips_provisioning() -> Result<()> {
        let store = Arc::new(MemoryAccountStore::new());
        let prompt = Arc::new(ProvisioningPrompt::new());
        store.create_federated(&identity(), &[1], &[2]).await?;
        let coordinator = coordinator(&store, &prompt);

        let account = coordinator
            .authenticate("good-token")
            .await
            .map_err(anyhow::Error::new)?;
        assert_eq!(account.username, "alice@example.com");
        assert!(prompt.pending().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn locked_account_fails_without_provisioning() -> Result<()> {
        let store = Arc::new(MemoryAccountStore::new());
        let prompt = Arc::new(ProvisioningPrompt::new());
        let created = store.create_federated(&identity(), &[1], &[2]).await?;
        store
            .set_status(created.account_id, AccountStatus::Locked)
            .await?;
        let coordinator = coordinator(&store, &prompt);

        let result = coordinator.authenticate("good-token").await;
        assert!(matches!(result, Err(AuthError::AccountLocked)));
        assert!(prompt.pending().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn provisioning_resolved_creates_one_account() -> Result<()> {
        let store = Arc::new(MemoryAccountStore::new());
        let prompt = Arc::new(ProvisioningPrompt::new());
        let coordinator = coordinator(&store, &prompt);

        let FederatedAuth::Provisioning(ticket) = coordinator.begin("good-token").await.map_err(anyhow::Error::new)? else {
            panic!("expected provisioning");
        };
        let request_id = ticket.request_id;
        prompt
            .resolve(request_id, Some(SecretString::from("p@ss1".to_string())))
            .await;
        let account = coordinator
            .complete(ticket)
            .await
            .map_err(anyhow::Error::new)?;

        assert_eq!(store.len().await, 1);
        assert_eq!(account.username, "alice@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn provisioning_cancelled_creates_no_account() -> Result<()> {
        let store = Arc::new(MemoryAccountStore::new());
        let prompt = Arc::new(ProvisioningPrompt::new());
        let coordinator = coordinator(&store, &prompt);

        let FederatedAuth::Provisioning(ticket) = coordinator.begin("good-token").await.map_err(anyhow::Error::new)? else {
            panic!("expected provisioning");
        };
        prompt.resolve(ticket.request_id, None).await;
        let result = coordinator.complete(ticket).await;

        assert!(matches!(result, Err(AuthError::ProvisioningAborted)));
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_provider_email_fails_exchange() {
        let store = Arc::new(MemoryAccountStore::new());
        let prompt = Arc::new(ProvisioningPrompt::new());
        let mut bad = identity();
        bad.email = "not-an-email".to_string();
        let provider = StaticIdentityProvider::new().with_identity("bad-email", bad);
        let coordinator = FederatedLoginCoordinator::new(
            Arc::new(provider),
            store.clone() as Arc<dyn AccountStore>,
            prompt,
            10,
        );

        let result = coordinator.authenticate("bad-email").await;
        assert!(matches!(result, Err(AuthError::ProviderExchangeFailed)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn static_provider_round_trips_identity() -> Result<()> {
        let provider = StaticIdentityProvider::new().with_identity("token", identity());
        let exchanged = provider.exchange_token("token").await?;
        assert_eq!(exchanged.subject, "subject-1");
        assert_eq!(
            exchanged.photo_url.as_deref(),
            Some("https://example.com/alice.png")
        );
        Ok(())
    }
}
