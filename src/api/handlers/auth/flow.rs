//! Login attempt orchestration.
//!
//! Free operation functions are what any interface calls; [`LoginFlow`]
//! layers the per-attempt state machine
//! (`Idle → ChallengeIssued → ChallengeVerified → Authenticating →
//! {Provisioning} → Succeeded | Failed`) on top of them for embedders that
//! drive a whole attempt in-process.

use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;
use ulid::Ulid;
use uuid::Uuid;

use super::challenge::ChallengeToken;
use super::error::AuthError;
use super::federated::FederatedAuth;
use super::session::Session;
use super::signal::TerminationSignal;
use super::state::AuthState;
use super::storage::AccountRef;

/// A held challenge token plus the user's response to it.
#[derive(Clone, Debug)]
pub struct ChallengeAnswer {
    pub token: String,
    pub response: String,
}

/// What the login boundary gets when it becomes active: a fresh challenge
/// and, at most once, the reason the prior session ended.
pub struct Activation {
    pub challenge: ChallengeToken,
    pub termination: Option<TerminationSignal>,
}

/// Activate the login boundary: issue a challenge and drain the pending
/// termination signal for the account context, if one is known.
pub async fn activate(state: &AuthState, account: Option<Uuid>) -> Result<Activation> {
    let challenge = state.gate().issue().await?;
    let termination = match account {
        Some(account_id) => state.signals().peek_and_clear(account_id).await,
        None => None,
    };
    Ok(Activation {
        challenge,
        termination,
    })
}

/// Clear the challenge gate for a submit.
///
/// An empty token means the submit never held one (`ChallengeRequired`);
/// everything else is the gate's verdict. Consuming on success and
/// discarding on failure both happen inside the gate, so after this call
/// the token is spent either way.
async fn clear_gate(state: &AuthState, answer: &ChallengeAnswer) -> Result<(), AuthError> {
    if answer.token.trim().is_empty() {
        return Err(AuthError::ChallengeRequired);
    }
    state.gate().verify(&answer.token, &answer.response).await
}

/// Credential login: challenge gate, then verifier, then session issue.
pub async fn login(
    state: &AuthState,
    username: &str,
    password: &str,
    answer: &ChallengeAnswer,
) -> Result<Session, AuthError> {
    clear_gate(state, answer).await?;
    let account = state.credential_verifier().verify(username, password).await?;
    issue(state, &account).await
}

/// Federated login: challenge gate, then the coordinator (which may suspend
/// on provisioning), then session issue.
pub async fn login_federated(
    state: &AuthState,
    provider_token: &str,
    answer: &ChallengeAnswer,
) -> Result<Session, AuthError> {
    clear_gate(state, answer).await?;
    let account = state.coordinator().authenticate(provider_token).await?;
    issue(state, &account).await
}

/// Resolve or cancel a pending provisioning request. Idempotent.
pub async fn resolve_provisioning(
    state: &AuthState,
    request_id: Uuid,
    password: Option<SecretString>,
) -> bool {
    state.prompt().resolve(request_id, password).await
}

async fn issue(state: &AuthState, account: &AccountRef) -> Result<Session, AuthError> {
    let session = state.issuer().issue(account).await?;
    debug!(account_id = %account.account_id, "session issued");
    Ok(session)
}

/// Phases of one login attempt. `Succeeded` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoginPhase {
    Idle,
    ChallengeIssued,
    ChallengeVerified,
    Authenticating,
    Provisioning,
    Succeeded,
    Failed,
}

/// One user-initiated login attempt, driven to a terminal phase.
pub struct LoginFlow {
    attempt_id: Ulid,
    phase: LoginPhase,
    challenge: Option<String>,
}

impl LoginFlow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempt_id: Ulid::new(),
            phase: LoginPhase::Idle,
            challenge: None,
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> Ulid {
        self.attempt_id
    }

    #[must_use]
    pub fn phase(&self) -> LoginPhase {
        self.phase
    }

    /// Issue (or reissue) the attempt's challenge; any held token is
    /// discarded first.
    pub async fn activate(
        &mut self,
        state: &AuthState,
        account: Option<Uuid>,
    ) -> Result<Activation> {
        if let Some(old_token) = self.challenge.take() {
            state.gate().discard(&old_token).await;
        }
        let activation = activate(state, account).await?;
        self.challenge = Some(activation.challenge.value.clone());
        self.phase = LoginPhase::ChallengeIssued;
        Ok(activation)
    }

    /// Submit credentials for this attempt.
    pub async fn submit(
        &mut self,
        state: &AuthState,
        username: &str,
        password: &str,
        challenge_response: &str,
    ) -> Result<Session, AuthError> {
        self.clear_gate(state, challenge_response).await?;
        self.phase = LoginPhase::Authenticating;
        let account = state.credential_verifier().verify(username, password).await;
        self.finish(state, account).await
    }

    /// Submit a federated login for this attempt, suspending on provisioning
    /// when the identity has no local account yet.
    pub async fn submit_federated(
        &mut self,
        state: &AuthState,
        provider_token: &str,
        challenge_response: &str,
    ) -> Result<Session, AuthError> {
        self.clear_gate(state, challenge_response).await?;
        self.phase = LoginPhase::Authenticating;
        let coordinator = state.coordinator();
        let account = match coordinator.begin(provider_token).await {
            Ok(FederatedAuth::Existing(account)) => Ok(account),
            Ok(FederatedAuth::Provisioning(ticket)) => {
                self.phase = LoginPhase::Provisioning;
                coordinator.complete(ticket).await
            }
            Err(err) => Err(err),
        };
        self.finish(state, account).await
    }

    /// Gate this submit on the held challenge token.
    ///
    /// A failed verification loops the attempt back to `ChallengeIssued`
    /// with a fresh token; submitting without one is `ChallengeRequired`.
    async fn clear_gate(
        &mut self,
        state: &AuthState,
        challenge_response: &str,
    ) -> Result<(), AuthError> {
        if self.phase != LoginPhase::ChallengeIssued {
            return Err(AuthError::ChallengeRequired);
        }
        let Some(token) = self.challenge.take() else {
            return Err(AuthError::ChallengeRequired);
        };
        match state.gate().verify(&token, challenge_response).await {
            Ok(()) => {
                self.phase = LoginPhase::ChallengeVerified;
                Ok(())
            }
            Err(err) => {
                // Old token is spent; rearm the attempt with a fresh one.
                let activation = activate(state, None).await?;
                self.challenge = Some(activation.challenge.value);
                self.phase = LoginPhase::ChallengeIssued;
                Err(err)
            }
        }
    }

    async fn finish(
        &mut self,
        state: &AuthState,
        account: Result<AccountRef, AuthError>,
    ) -> Result<Session, AuthError> {
        match account {
            Ok(account) => match issue(state, &account).await {
                Ok(session) => {
                    self.phase = LoginPhase::Succeeded;
                    Ok(session)
                }
                Err(err) => {
                    self.phase = LoginPhase::Failed;
                    Err(err)
                }
            },
            Err(err) => {
                self.phase = LoginPhase::Failed;
                Err(err)
            }
        }
    }
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new()
    }
}
