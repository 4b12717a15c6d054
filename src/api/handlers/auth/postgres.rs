//! Postgres-backed account store.
//!
//! Schema lives in `sql/schema.sql`. Queries are instrumented with `db.query`
//! spans so account lookups show up in traces alongside the HTTP request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::federated::FederatedIdentity;
use super::storage::{AccountRecord, AccountRef, AccountStatus, AccountStore, Role};
use super::utils::normalize_username;

const ACCOUNT_COLUMNS: &str = r"
    id, username, email, password_hash, salt, status, role,
    provider_subject, display_name, photo_url
";

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<AccountRecord> {
    let status: String = row.get("status");
    let role: String = row.get("role");
    Ok(AccountRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        salt: row.get("salt"),
        status: AccountStatus::parse(&status)?,
        role: Role::parse(&role)?,
        provider_subject: row.get("provider_subject"),
        display_name: row.get("display_name"),
        photo_url: row.get("photo_url"),
    })
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn lookup_by_username(&self, username: &str) -> Result<Option<AccountRecord>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by username")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn lookup_federated(&self, subject: &str, email: &str) -> Result<Option<AccountRecord>> {
        // Prefer the subject binding; email is the fallback for accounts that
        // existed before the identity was linked.
        let query = format!(
            r"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE provider_subject = $1 OR email = $2
            ORDER BY (provider_subject = $1) DESC
            LIMIT 1
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(subject)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup federated account")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn create_federated(
        &self,
        identity: &FederatedIdentity,
        password_hash: &[u8],
        salt: &[u8],
    ) -> Result<AccountRef> {
        // Single insert; a unique violation on provider_subject or email means
        // a concurrent provisioning won and nothing partial was written.
        let query = r"
            INSERT INTO accounts
                (username, email, password_hash, salt, status, role,
                 provider_subject, display_name, photo_url)
            VALUES ($1, $2, $3, $4, 'active', 'user', $5, $6, $7)
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let username = normalize_username(&identity.email);
        let row = sqlx::query(query)
            .bind(&username)
            .bind(&identity.email)
            .bind(password_hash)
            .bind(salt)
            .bind(&identity.subject)
            .bind(&identity.display_name)
            .bind(&identity.photo_url)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to create federated account")?;

        Ok(AccountRef {
            account_id: row.get("id"),
            username,
            role: Role::User,
        })
    }

    async fn set_status(&self, account_id: Uuid, status: AccountStatus) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET status = $2, updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update account status")?;
        Ok(())
    }
}
