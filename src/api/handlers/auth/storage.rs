//! Account records and the persistence boundary for the auth core.
//!
//! The core consumes accounts through the narrow [`AccountStore`] interface;
//! [`MemoryAccountStore`] backs tests and dsn-less local runs, the Postgres
//! implementation lives in `postgres.rs`.

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::federated::FederatedIdentity;
use super::utils::normalize_username;

/// Account lifecycle status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccountStatus {
    Active,
    Locked,
    Deleted,
}

impl AccountStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Locked => "locked",
            Self::Deleted => "deleted",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(Self::Active),
            "locked" => Ok(Self::Locked),
            "deleted" => Ok(Self::Deleted),
            other => bail!("unknown account status: {other}"),
        }
    }
}

/// Authorization tier. A closed enumeration, never free-form strings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    SuperAdmin,
    Admin,
    User,
}

impl Role {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self> {
        match value {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => bail!("unknown role: {other}"),
        }
    }
}

/// Full account row as the store returns it.
#[derive(Clone, Debug)]
pub struct AccountRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub status: AccountStatus,
    pub role: Role,
    /// Subject id asserted by the identity provider, for federated accounts.
    pub provider_subject: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl AccountRecord {
    #[must_use]
    pub fn account_ref(&self) -> AccountRef {
        AccountRef {
            account_id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// What successful authentication yields to the session issuer.
#[derive(Clone, Debug)]
pub struct AccountRef {
    pub account_id: Uuid,
    pub username: String,
    pub role: Role,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn lookup_by_username(&self, username: &str) -> Result<Option<AccountRecord>>;

    /// Look up a federated account by provider subject, falling back to email.
    async fn lookup_federated(&self, subject: &str, email: &str) -> Result<Option<AccountRecord>>;

    /// Create an account bound to a federated identity.
    ///
    /// A single atomic insert: on any failure no partial record remains.
    async fn create_federated(
        &self,
        identity: &FederatedIdentity,
        password_hash: &[u8],
        salt: &[u8],
    ) -> Result<AccountRef>;

    async fn set_status(&self, account_id: Uuid, status: AccountStatus) -> Result<()>;
}

/// In-memory account store for tests and dsn-less local runs.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, AccountRecord>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: AccountRecord) {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn lookup_by_username(&self, username: &str) -> Result<Option<AccountRecord>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|record| record.username == username)
            .cloned())
    }

    async fn lookup_federated(&self, subject: &str, email: &str) -> Result<Option<AccountRecord>> {
        let accounts = self.accounts.lock().await;
        let by_subject = accounts
            .values()
            .find(|record| record.provider_subject.as_deref() == Some(subject));
        let found = by_subject.or_else(|| accounts.values().find(|record| record.email == email));
        Ok(found.cloned())
    }

    async fn create_federated(
        &self,
        identity: &FederatedIdentity,
        password_hash: &[u8],
        salt: &[u8],
    ) -> Result<AccountRef> {
        let mut accounts = self.accounts.lock().await;
        if accounts
            .values()
            .any(|record| record.provider_subject.as_deref() == Some(identity.subject.as_str()))
        {
            bail!("account already exists for subject {}", identity.subject);
        }

        let record = AccountRecord {
            id: Uuid::new_v4(),
            username: normalize_username(&identity.email),
            email: identity.email.clone(),
            password_hash: password_hash.to_vec(),
            salt: salt.to_vec(),
            status: AccountStatus::Active,
            role: Role::User,
            provider_subject: Some(identity.subject.clone()),
            display_name: Some(identity.display_name.clone()),
            photo_url: identity.photo_url.clone(),
        };
        let account_ref = record.account_ref();
        accounts.insert(record.id, record);
        Ok(account_ref)
    }

    async fn set_status(&self, account_id: Uuid, status: AccountStatus) -> Result<()> {
        let mut accounts = self.accounts.lock().await;
        match accounts.get_mut(&account_id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => bail!("unknown account: {account_id}"),
        }
    }
}
