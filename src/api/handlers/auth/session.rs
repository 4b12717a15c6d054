//! Session issuance and the single-active-session invariant.
//!
//! The issuer owns the canonical account → session mapping. Issuing a new
//! session for an account that already has an active one supersedes the old
//! session and publishes a `Conflict` signal in the same critical section,
//! so the displaced context learns why on its next check. Raw tokens never
//! sit in the table; sessions are keyed by token hash.

use anyhow::{Result, anyhow};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::signal::{SessionSignalChannel, TerminationSignal};
use super::state::AuthState;
use super::storage::{AccountRef, Role};
use super::types::SessionInfoResponse;
use super::utils::{extract_bearer_token, generate_token, hash_token};

/// An authorized session, returned once with its raw token.
#[derive(Clone, Debug)]
pub struct Session {
    pub account_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

/// What a token lookup yields; the raw token is never recoverable.
#[derive(Clone, Debug)]
pub struct ActiveSession {
    pub account_id: Uuid,
    pub username: String,
    pub role: Role,
}

#[derive(Debug)]
struct StoredSession {
    account_id: Uuid,
    username: String,
    role: Role,
    issued_at: Instant,
    /// Token hash of the session that superseded this one, if any.
    superseded_by: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct SessionTable {
    /// All sessions, keyed by token hash; superseded entries stay until the
    /// expiry sweep removes them.
    sessions: HashMap<Vec<u8>, StoredSession>,
    /// Account → token hash of the one active session.
    active: HashMap<Uuid, Vec<u8>>,
}

pub struct SessionIssuer {
    ttl: Duration,
    signals: Arc<SessionSignalChannel>,
    table: Mutex<SessionTable>,
}

impl SessionIssuer {
    pub fn new(ttl: Duration, signals: Arc<SessionSignalChannel>) -> Self {
        Self {
            ttl,
            signals,
            table: Mutex::new(SessionTable::default()),
        }
    }

    /// Mint a session for the account, superseding any active one.
    ///
    /// Read-active, mark-superseded, and write-new happen under one lock;
    /// concurrent issues for the same account serialize here and the loser's
    /// context is informed via `Conflict` on its next check.
    pub async fn issue(&self, account: &AccountRef) -> Result<Session> {
        let token = generate_token()?;
        let token_hash = hash_token(&token);

        let mut table = self.table.lock().await;
        if table.sessions.contains_key(&token_hash) {
            // 256-bit collision; treat as a generation fault rather than
            // silently superseding an unrelated session.
            return Err(anyhow!("session token collision"));
        }
        let previous = table
            .active
            .insert(account.account_id, token_hash.clone());
        if let Some(previous_hash) = previous {
            if let Some(previous_session) = table.sessions.get_mut(&previous_hash) {
                previous_session.superseded_by = Some(token_hash.clone());
            }
            self.signals
                .publish(account.account_id, TerminationSignal::Conflict)
                .await;
            debug!(account_id = %account.account_id, "superseded active session");
        }
        table.sessions.insert(
            token_hash,
            StoredSession {
                account_id: account.account_id,
                username: account.username.clone(),
                role: account.role,
                issued_at: Instant::now(),
                superseded_by: None,
            },
        );

        Ok(Session {
            account_id: account.account_id,
            username: account.username.clone(),
            role: account.role,
            token,
        })
    }

    /// Resolve a raw token into its session, if still active and unexpired.
    pub async fn lookup(&self, token: &str) -> Option<ActiveSession> {
        let token_hash = hash_token(token);
        let table = self.table.lock().await;
        let stored = table.sessions.get(&token_hash)?;
        if stored.superseded_by.is_some() || stored.issued_at.elapsed() >= self.ttl {
            return None;
        }
        Some(ActiveSession {
            account_id: stored.account_id,
            username: stored.username.clone(),
            role: stored.role,
        })
    }

    /// Invalidate one session out of band, publishing the reason.
    pub async fn invalidate(&self, token: &str, reason: TerminationSignal) {
        let token_hash = hash_token(token);
        let mut table = self.table.lock().await;
        let Some(stored) = table.sessions.remove(&token_hash) else {
            return;
        };
        let was_active = table
            .active
            .get(&stored.account_id)
            .is_some_and(|active_hash| *active_hash == token_hash);
        if was_active {
            table.active.remove(&stored.account_id);
            self.signals.publish(stored.account_id, reason).await;
        }
    }

    /// Invalidate an account's active session out of band (admin lock,
    /// account deletion), publishing the reason.
    pub async fn invalidate_account(&self, account_id: Uuid, reason: TerminationSignal) {
        let mut table = self.table.lock().await;
        let Some(token_hash) = table.active.remove(&account_id) else {
            return;
        };
        table.sessions.remove(&token_hash);
        self.signals.publish(account_id, reason).await;
    }

    /// User-initiated logout: drop the session without a termination signal,
    /// there is nothing to explain on the next visit.
    pub async fn revoke(&self, token: &str) {
        let token_hash = hash_token(token);
        let mut table = self.table.lock().await;
        let Some(stored) = table.sessions.remove(&token_hash) else {
            return;
        };
        let was_active = table
            .active
            .get(&stored.account_id)
            .is_some_and(|active_hash| *active_hash == token_hash);
        if was_active {
            table.active.remove(&stored.account_id);
        }
    }

    /// Sweep sessions past the TTL, publishing `Expired` for each active one.
    ///
    /// The core has no built-in timeout; this is driven by the caller (the
    /// server's background worker). Returns the number of sessions removed.
    pub async fn purge_expired(&self) -> usize {
        let mut table = self.table.lock().await;
        let expired: Vec<Vec<u8>> = table
            .sessions
            .iter()
            .filter(|(_, stored)| stored.issued_at.elapsed() >= self.ttl)
            .map(|(token_hash, _)| token_hash.clone())
            .collect();

        let mut expired_accounts = Vec::new();
        for token_hash in &expired {
            let Some(stored) = table.sessions.remove(token_hash) else {
                continue;
            };
            let was_active = table
                .active
                .get(&stored.account_id)
                .is_some_and(|active_hash| active_hash == token_hash);
            if was_active {
                table.active.remove(&stored.account_id);
                expired_accounts.push(stored.account_id);
            }
        }
        for account_id in expired_accounts {
            self.signals
                .publish(account_id, TerminationSignal::Expired)
                .await;
        }
        expired.len()
    }

    /// Sessions for the account with `superseded_by` unset. Invariant: ≤ 1.
    #[cfg(test)]
    pub(crate) async fn unsuperseded_count(&self, account_id: Uuid) -> usize {
        let table = self.table.lock().await;
        table
            .sessions
            .values()
            .filter(|stored| stored.account_id == account_id && stored.superseded_by.is_none())
            .count()
    }
}

/// Background sweep for expired sessions.
pub fn spawn_expiry_worker(state: Arc<AuthState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh server does
        // not sweep before anything could expire.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = state.issuer().purge_expired().await;
            if purged > 0 {
                info!(purged, "expired sessions removed");
            }
        }
    });
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionInfoResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // A missing header is treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match auth_state.issuer().lookup(&token).await {
        Some(active) => {
            let response = SessionInfoResponse {
                account_id: active.account_id.to_string(),
                username: active.username,
                role: active.role.as_str().to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Logout is idempotent; a missing or stale token is fine.
    if let Some(token) = extract_bearer_token(&headers) {
        auth_state.issuer().revoke(&token).await;
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::SessionIssuer;
    use crate::api::handlers::auth::signal::{SessionSignalChannel, TerminationSignal};
    use crate::api::handlers::auth::storage::{AccountRef, Role};
    use anyhow::Result;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn account() -> AccountRef {
        AccountRef {
            account_id: Uuid::new_v4(),
            username: "alice".to_string(),
            role: Role::User,
        }
    }

    fn issuer(signals: &Arc<SessionSignalChannel>) -> SessionIssuer {
        SessionIssuer::new(Duration::from_secs(60), signals.clone())
    }

    #[tokio::test]
    async fn issue_and_lookup_round_trip() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = issuer(&signals);
        let account = account();

        let session = issuer.issue(&account).await?;
        let active = issuer.lookup(&session.token).await.expect("active session");
        assert_eq!(active.account_id, account.account_id);
        assert_eq!(active.username, "alice");
        Ok(())
    }

    #[tokio::test]
    async fn second_issue_supersedes_and_signals_conflict_once() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = issuer(&signals);
        let account = account();

        let first = issuer.issue(&account).await?;
        let second = issuer.issue(&account).await?;

        assert!(issuer.lookup(&first.token).await.is_none());
        assert!(issuer.lookup(&second.token).await.is_some());
        assert_eq!(issuer.unsuperseded_count(account.account_id).await, 1);
        assert_eq!(
            signals.peek_and_clear(account.account_id).await,
            Some(TerminationSignal::Conflict)
        );
        assert_eq!(signals.peek_and_clear(account.account_id).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_issues_leave_one_active_session() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = Arc::new(SessionIssuer::new(Duration::from_secs(60), signals));
        let account = account();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let issuer = issuer.clone();
            let account = account.clone();
            handles.push(tokio::spawn(
                async move { issuer.issue(&account).await },
            ));
        }
        for handle in handles {
            handle.await??;
        }

        assert_eq!(issuer.unsuperseded_count(account.account_id).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_publishes_the_given_reason() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = issuer(&signals);
        let account = account();

        let session = issuer.issue(&account).await?;
        issuer
            .invalidate(&session.token, TerminationSignal::Locked)
            .await;

        assert!(issuer.lookup(&session.token).await.is_none());
        assert_eq!(
            signals.peek_and_clear(account.account_id).await,
            Some(TerminationSignal::Locked)
        );
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_account_removes_active_session() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = issuer(&signals);
        let account = account();

        let session = issuer.issue(&account).await?;
        issuer
            .invalidate_account(account.account_id, TerminationSignal::Deleted)
            .await;

        assert!(issuer.lookup(&session.token).await.is_none());
        assert_eq!(
            signals.peek_and_clear(account.account_id).await,
            Some(TerminationSignal::Deleted)
        );
        Ok(())
    }

    #[tokio::test]
    async fn revoke_writes_no_signal() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = issuer(&signals);
        let account = account();

        let session = issuer.issue(&account).await?;
        issuer.revoke(&session.token).await;

        assert!(issuer.lookup(&session.token).await.is_none());
        assert_eq!(signals.peek_and_clear(account.account_id).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn purge_expired_publishes_expired() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = SessionIssuer::new(Duration::from_millis(0), signals.clone());
        let account = account();

        let _session = issuer.issue(&account).await?;
        let purged = issuer.purge_expired().await;

        assert_eq!(purged, 1);
        assert_eq!(
            signals.peek_and_clear(account.account_id).await,
            Some(TerminationSignal::Expired)
        );
        Ok(())
    }

    #[tokio::test]
    async fn lookup_ignores_expired_sessions() -> Result<()> {
        let signals = Arc::new(SessionSignalChannel::new());
        let issuer = SessionIssuer::new(Duration::from_millis(0), signals);
        let account = account();

        let session = issuer.issue(&account).await?;
        assert!(issuer.lookup(&session.token).await.is_none());
        Ok(())
    }
}
