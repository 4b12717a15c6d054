//! Username/password verification against the account store.

use std::sync::Arc;

use super::error::AuthError;
use super::storage::{AccountRef, AccountStatus, AccountStore};
use super::utils::{normalize_username, verify_password};

/// Stateless delegation to the account store.
///
/// Locked, deleted, and unknown/mismatched credentials stay distinct error
/// kinds; the login boundary keys its messaging off them.
pub struct CredentialVerifier {
    accounts: Arc<dyn AccountStore>,
    hash_rounds: u32,
}

impl CredentialVerifier {
    pub fn new(accounts: Arc<dyn AccountStore>, hash_rounds: u32) -> Self {
        Self {
            accounts,
            hash_rounds,
        }
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<AccountRef, AuthError> {
        let username = normalize_username(username);
        let Some(record) = self.accounts.lookup_by_username(&username).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        match record.status {
            AccountStatus::Locked => Err(AuthError::AccountLocked),
            AccountStatus::Deleted => Err(AuthError::AccountDeleted),
            AccountStatus::Active => {
                if verify_password(password, &record.salt, self.hash_rounds, &record.password_hash)
                {
                    Ok(record.account_ref())
                } else {
                    Err(AuthError::InvalidCredentials)
                }
            }
        }
    }
}
