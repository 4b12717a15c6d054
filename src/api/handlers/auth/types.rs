//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::signal::TerminationSignal;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct ActivateRequest {
    /// Account context for termination-signal delivery, when known.
    pub account_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivateResponse {
    pub challenge_token: String,
    pub challenge_expires_in_seconds: u64,
    /// Why the prior session ended, delivered at most once.
    pub termination: Option<TerminationNotice>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TerminationNotice {
    pub reason: TerminationSignal,
    pub message: String,
}

impl TerminationNotice {
    #[must_use]
    pub fn from_signal(signal: TerminationSignal) -> Self {
        Self {
            reason: signal,
            message: signal.user_message().to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub challenge_token: String,
    pub challenge_response: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FederatedLoginRequest {
    pub provider_token: String,
    pub challenge_token: String,
    pub challenge_response: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub account_id: String,
    pub username: String,
    pub role: String,
    /// Opaque bearer token; shown once, only its hash is retained.
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionInfoResponse {
    pub account_id: String,
    pub username: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProvisioningPendingResponse {
    pub request_id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProvisioningResolveRequest {
    pub request_id: String,
    /// First-time password; omit or leave empty to cancel.
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            username: "alice".to_string(),
            password: "p@ss1".to_string(),
            challenge_token: "token".to_string(),
            challenge_response: "response".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let username = value
            .get("username")
            .and_then(serde_json::Value::as_str)
            .context("missing username")?;
        assert_eq!(username, "alice");
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.challenge_token, "token");
        Ok(())
    }

    #[test]
    fn termination_notice_carries_reason_and_message() -> Result<()> {
        let notice = TerminationNotice::from_signal(TerminationSignal::Conflict);
        let value = serde_json::to_value(&notice)?;
        assert_eq!(
            value.get("reason").and_then(serde_json::Value::as_str),
            Some("conflict")
        );
        assert!(
            value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|message| !message.is_empty())
        );
        Ok(())
    }

    #[test]
    fn provisioning_resolve_password_is_optional() -> Result<()> {
        let decoded: ProvisioningResolveRequest =
            serde_json::from_str(r#"{"request_id":"abc"}"#)?;
        assert_eq!(decoded.request_id, "abc");
        assert!(decoded.password.is_none());
        Ok(())
    }
}
