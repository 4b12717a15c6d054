//! Anti-bot challenge gate.
//!
//! Tokens are single-use: consumption is check-unconsumed-then-consume under
//! one lock, so two concurrent verifications of the same token cannot both
//! succeed. Response checking itself is delegated to a [`ChallengeVerifier`];
//! the gate only owns token lifecycle.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::error;

use super::error::AuthError;
use super::utils::generate_token;

/// One-time proof that a login attempt passed bot mitigation.
#[derive(Clone, Debug)]
pub struct ChallengeToken {
    pub value: String,
    pub issued_at: Instant,
    pub expires_in: Duration,
}

#[derive(Debug)]
struct ChallengeEntry {
    issued_at: Instant,
    consumed: bool,
}

/// Checks a challenge response against the mitigation provider.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify_response(&self, token: &str, response: &str) -> bool;
}

/// Remote challenge-verification service.
///
/// POSTs `{token, response}` to `{verify_url}/verify`; only `202 Accepted`
/// counts as a pass, anything else (including transport errors) fails closed.
pub struct HttpChallengeVerifier {
    client: Client,
    verify_url: String,
}

impl HttpChallengeVerifier {
    pub fn new(verify_url: String) -> Result<Self> {
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self { client, verify_url })
    }
}

#[async_trait]
impl ChallengeVerifier for HttpChallengeVerifier {
    async fn verify_response(&self, token: &str, response: &str) -> bool {
        let body = json!({ "token": token, "response": response });
        match self
            .client
            .post(format!("{}/verify", self.verify_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
        {
            Ok(reply) => {
                if reply.status() == StatusCode::ACCEPTED {
                    true
                } else {
                    error!("Challenge validation failed: {}", reply.status());
                    false
                }
            }
            Err(err) => {
                error!("Error validating challenge: {err:?}");
                false
            }
        }
    }
}

/// Local verifier for tests and dsn-less development.
///
/// With an expected response it compares exactly; without one it accepts
/// everything.
#[derive(Debug, Default)]
pub struct StaticChallengeVerifier {
    expected: Option<String>,
}

impl StaticChallengeVerifier {
    #[must_use]
    pub fn accepting(expected: &str) -> Self {
        Self {
            expected: Some(expected.to_string()),
        }
    }

    #[must_use]
    pub fn accept_all() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeVerifier for StaticChallengeVerifier {
    async fn verify_response(&self, _token: &str, response: &str) -> bool {
        match &self.expected {
            Some(expected) => expected == response,
            None => true,
        }
    }
}

/// Issues and consumes challenge tokens.
pub struct ChallengeGate {
    ttl: Duration,
    verifier: Arc<dyn ChallengeVerifier>,
    entries: Mutex<HashMap<String, ChallengeEntry>>,
}

impl ChallengeGate {
    pub fn new(ttl: Duration, verifier: Arc<dyn ChallengeVerifier>) -> Self {
        Self {
            ttl,
            verifier,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh token. Expired entries are swept opportunistically.
    pub async fn issue(&self) -> Result<ChallengeToken> {
        let value = generate_token()?;
        let issued_at = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.issued_at.elapsed() < self.ttl);
        entries.insert(
            value.clone(),
            ChallengeEntry {
                issued_at,
                consumed: false,
            },
        );
        Ok(ChallengeToken {
            value,
            issued_at,
            expires_in: self.ttl,
        })
    }

    /// Verify a response against a held token, consuming the token.
    ///
    /// Unknown, expired, or already-consumed tokens fail with
    /// `ChallengeInvalid`. A failed response check discards the token; the
    /// caller must request a fresh one, retries on the same token never pass.
    pub async fn verify(&self, token: &str, response: &str) -> Result<(), AuthError> {
        {
            let mut entries = self.entries.lock().await;
            let Some(entry) = entries.get_mut(token) else {
                return Err(AuthError::ChallengeInvalid);
            };
            if entry.issued_at.elapsed() >= self.ttl {
                entries.remove(token);
                return Err(AuthError::ChallengeInvalid);
            }
            if entry.consumed {
                return Err(AuthError::ChallengeInvalid);
            }
            // Reserve the token before the provider round trip so a
            // concurrent verification of the same token cannot also pass.
            entry.consumed = true;
        }

        if self.verifier.verify_response(token, response).await {
            Ok(())
        } else {
            let mut entries = self.entries.lock().await;
            entries.remove(token);
            Err(AuthError::ChallengeInvalid)
        }
    }

    /// Drop a token early, e.g. when an attempt restarts.
    pub async fn discard(&self, token: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(token);
    }

    #[cfg(test)]
    pub(crate) async fn held_tokens(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChallengeGate, StaticChallengeVerifier};
    use crate::api::handlers::auth::error::AuthError;
    use anyhow::Result;
    use std::sync::Arc;
    use std::time::Duration;

    fn gate(expected: &str) -> ChallengeGate {
        ChallengeGate::new(
            Duration::from_secs(60),
            Arc::new(StaticChallengeVerifier::accepting(expected)),
        )
    }

    #[tokio::test]
    async fn token_verifies_at_most_once() -> Result<()> {
        let gate = gate("ok");
        let token = gate.issue().await?;

        gate.verify(&token.value, "ok")
            .await
            .map_err(anyhow::Error::new)?;
        let second = gate.verify(&token.value, "ok").await;
        assert!(matches!(second, Err(AuthError::ChallengeInvalid)));
        Ok(())
    }

    #[tokio::test]
    async fn failed_response_discards_the_token() -> Result<()> {
        let gate = gate("ok");
        let token = gate.issue().await?;

        let first = gate.verify(&token.value, "wrong").await;
        assert!(matches!(first, Err(AuthError::ChallengeInvalid)));
        // Token is gone, a correct response no longer helps.
        let second = gate.verify(&token.value, "ok").await;
        assert!(matches!(second, Err(AuthError::ChallengeInvalid)));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_fails() {
        let gate = gate("ok");
        let result = gate.verify("no-such-token", "ok").await;
        assert!(matches!(result, Err(AuthError::ChallengeInvalid)));
    }

    #[tokio::test]
    async fn expired_token_fails_and_is_swept() -> Result<()> {
        let gate = ChallengeGate::new(
            Duration::from_millis(0),
            Arc::new(StaticChallengeVerifier::accepting("ok")),
        );
        let token = gate.issue().await?;
        let result = gate.verify(&token.value, "ok").await;
        assert!(matches!(result, Err(AuthError::ChallengeInvalid)));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_verifications_cannot_both_pass() -> Result<()> {
        let gate = Arc::new(gate("ok"));
        let token = gate.issue().await?;

        let first = tokio::spawn({
            let gate = gate.clone();
            let value = token.value.clone();
            async move { gate.verify(&value, "ok").await }
        });
        let second = tokio::spawn({
            let gate = gate.clone();
            let value = token.value.clone();
            async move { gate.verify(&value, "ok").await }
        });

        let outcomes = [first.await?, second.await?];
        let passes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        assert_eq!(passes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn discard_forgets_the_token() -> Result<()> {
        let gate = gate("ok");
        let token = gate.issue().await?;
        gate.discard(&token.value).await;
        assert_eq!(gate.held_tokens().await, 0);
        let result = gate.verify(&token.value, "ok").await;
        assert!(matches!(result, Err(AuthError::ChallengeInvalid)));
        Ok(())
    }

    #[tokio::test]
    async fn accept_all_verifier_passes_any_response() -> Result<()> {
        let gate = ChallengeGate::new(
            Duration::from_secs(60),
            Arc::new(StaticChallengeVerifier::accept_all()),
        );
        let token = gate.issue().await?;
        assert!(gate.verify(&token.value, "anything").await.is_ok());
        Ok(())
    }
}
