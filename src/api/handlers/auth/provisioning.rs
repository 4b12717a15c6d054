//! Out-of-band provisioning prompt for first-time federated users.
//!
//! Each request is a oneshot channel: the coordinator suspends on the
//! receiver while an out-of-band surface resolves it with a chosen password
//! or cancels with `None`. The resolver is removed from the pending map and
//! consumed on first use, so double resolution is impossible; a second
//! resolve for the same id is a no-op.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;
use uuid::Uuid;

use super::federated::FederatedIdentity;
use super::state::AuthState;
use super::types::{ProvisioningPendingResponse, ProvisioningResolveRequest};

/// A pending provisioning request as listed to out-of-band surfaces.
#[derive(Clone, Debug)]
pub struct PendingProvisioning {
    pub id: Uuid,
    pub identity: FederatedIdentity,
}

struct PendingEntry {
    identity: FederatedIdentity,
    resolver: oneshot::Sender<Option<SecretString>>,
}

/// Promise-style request/response channel for first-time passwords.
#[derive(Default)]
pub struct ProvisioningPrompt {
    pending: Mutex<HashMap<Uuid, PendingEntry>>,
}

impl ProvisioningPrompt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request for the identity and hand back its resolution future.
    ///
    /// The coordinator awaits the receiver before it can open another
    /// request, so one invocation never has two outstanding.
    pub async fn open(
        &self,
        identity: FederatedIdentity,
    ) -> (Uuid, oneshot::Receiver<Option<SecretString>>) {
        let (resolver, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        let mut pending = self.pending.lock().await;
        pending.insert(id, PendingEntry { identity, resolver });
        (id, receiver)
    }

    /// Open requests, oldest data intact, for rendering the prompt.
    pub async fn pending(&self) -> Vec<PendingProvisioning> {
        let pending = self.pending.lock().await;
        pending
            .iter()
            .map(|(id, entry)| PendingProvisioning {
                id: *id,
                identity: entry.identity.clone(),
            })
            .collect()
    }

    /// Resolve a request with a password, or cancel it with `None`.
    ///
    /// Terminal and single-fire: returns `false` when the id is unknown or
    /// already resolved, making repeated cancels/resolves harmless.
    pub async fn resolve(&self, id: Uuid, outcome: Option<SecretString>) -> bool {
        let entry = {
            let mut pending = self.pending.lock().await;
            pending.remove(&id)
        };
        let Some(entry) = entry else {
            return false;
        };
        if entry.resolver.send(outcome).is_err() {
            // The requesting login was dropped; the request still counts as
            // resolved.
            debug!(request_id = %id, "provisioning requester went away");
        }
        true
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/provisioning",
    responses(
        (status = 200, description = "Pending provisioning requests", body = [ProvisioningPendingResponse])
    ),
    tag = "auth"
)]
pub async fn provisioning_pending(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let pending: Vec<ProvisioningPendingResponse> = auth_state
        .prompt()
        .pending()
        .await
        .into_iter()
        .map(|request| ProvisioningPendingResponse {
            request_id: request.id.to_string(),
            email: request.identity.email,
            display_name: request.identity.display_name,
        })
        .collect();
    (StatusCode::OK, Json(pending))
}

#[utoipa::path(
    post,
    path = "/v1/auth/provisioning",
    request_body = ProvisioningResolveRequest,
    responses(
        (status = 204, description = "Resolution accepted"),
        (status = 400, description = "Validation error", body = String)
    ),
    tag = "auth"
)]
pub async fn provisioning_resolve(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ProvisioningResolveRequest>>,
) -> impl IntoResponse {
    let request: ProvisioningResolveRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let Ok(request_id) = Uuid::parse_str(request.request_id.trim()) else {
        return (StatusCode::BAD_REQUEST, "Invalid request id".to_string()).into_response();
    };

    let outcome = request
        .password
        .filter(|password| !password.is_empty())
        .map(SecretString::from);
    // Always 204: an unknown or already-resolved id is indistinguishable on
    // purpose, resolution is idempotent.
    auth_state.prompt().resolve(request_id, outcome).await;
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::ProvisioningPrompt;
    use crate::api::handlers::auth::federated::FederatedIdentity;
    use secrecy::{ExposeSecret, SecretString};
    use uuid::Uuid;

    fn identity() -> FederatedIdentity {
        FederatedIdentity {
            subject: "subject-1".to_string(),
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn resolve_delivers_password_once() {
        let prompt = ProvisioningPrompt::new();
        let (id, receiver) = prompt.open(identity()).await;

        assert!(prompt.resolve(id, Some(SecretString::from("p@ss1".to_string()))).await);
        let outcome = receiver.await.expect("resolution");
        assert_eq!(outcome.expect("password").expose_secret(), "p@ss1");

        // Second resolution is a no-op.
        assert!(!prompt.resolve(id, None).await);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let prompt = ProvisioningPrompt::new();
        let (id, receiver) = prompt.open(identity()).await;

        assert!(prompt.resolve(id, None).await);
        assert!(!prompt.resolve(id, None).await);
        assert!(receiver.await.expect("resolution").is_none());
    }

    #[tokio::test]
    async fn unknown_id_is_a_noop() {
        let prompt = ProvisioningPrompt::new();
        assert!(!prompt.resolve(Uuid::new_v4(), None).await);
    }

    #[tokio::test]
    async fn pending_lists_open_requests() {
        let prompt = ProvisioningPrompt::new();
        let (id, _receiver) = prompt.open(identity()).await;

        let pending = prompt.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].identity.email, "alice@example.com");

        prompt.resolve(id, None).await;
        assert!(prompt.pending().await.is_empty());
    }

    #[tokio::test]
    async fn dropped_requester_still_counts_as_resolved() {
        let prompt = ProvisioningPrompt::new();
        let (id, receiver) = prompt.open(identity()).await;
        drop(receiver);
        assert!(prompt.resolve(id, None).await);
    }
}
