//! Login endpoints: activation, credential login, federated login.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::error::{AuthError, auth_error_response};
use super::flow::{self, ChallengeAnswer};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::types::{
    ActivateRequest, ActivateResponse, FederatedLoginRequest, LoginRequest, SessionResponse,
    TerminationNotice,
};
use super::utils::{extract_client_ip, normalize_username};

#[utoipa::path(
    post,
    path = "/v1/auth/activate",
    request_body = ActivateRequest,
    responses(
        (status = 200, description = "Fresh challenge and pending termination notice", body = ActivateResponse),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn activate(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ActivateRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(payload)| payload).unwrap_or_default();

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Activate)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    // An unparsable account context only means no signal can be delivered;
    // the activation itself still succeeds.
    let account = request
        .account_id
        .as_deref()
        .and_then(|value| Uuid::parse_str(value.trim()).ok());

    match flow::activate(&auth_state, account).await {
        Ok(activation) => {
            let response = ActivateResponse {
                challenge_token: activation.challenge.value,
                challenge_expires_in_seconds: activation.challenge.expires_in.as_secs(),
                termination: activation.termination.map(TerminationNotice::from_signal),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!("Failed to activate login boundary: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Activation failed".to_string(),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 400, description = "Challenge missing or invalid", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Rate-limit before touching the gate to keep abuse cheap to reject.
    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }
    let username = normalize_username(&request.username);
    if auth_state
        .rate_limiter()
        .check_username(&username, RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let answer = ChallengeAnswer {
        token: request.challenge_token,
        response: request.challenge_response,
    };
    match flow::login(&auth_state, &username, &request.password, &answer).await {
        Ok(session) => session_response(session).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/federated",
    request_body = FederatedLoginRequest,
    responses(
        (status = 200, description = "Session issued; first-time identities suspend on provisioning", body = SessionResponse),
        (status = 400, description = "Challenge missing or invalid", body = String),
        (status = 409, description = "Provisioning cancelled", body = String),
        (status = 429, description = "Rate limited", body = String),
        (status = 502, description = "Provider exchange failed", body = String)
    ),
    tag = "auth"
)]
pub async fn login_federated(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<FederatedLoginRequest>>,
) -> impl IntoResponse {
    let request: FederatedLoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let answer = ChallengeAnswer {
        token: request.challenge_token,
        response: request.challenge_response,
    };
    // Suspends here while provisioning is pending; resolution arrives via
    // POST /v1/auth/provisioning.
    match flow::login_federated(&auth_state, &request.provider_token, &answer).await {
        Ok(session) => session_response(session).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

fn session_response(session: super::session::Session) -> (StatusCode, Json<SessionResponse>) {
    (
        StatusCode::OK,
        Json(SessionResponse {
            account_id: session.account_id.to_string(),
            username: session.username,
            role: session.role.as_str().to_string(),
            token: session.token,
        }),
    )
}

fn error_response(err: &AuthError) -> (StatusCode, String) {
    if let AuthError::Internal(inner) = err {
        error!("Login failed: {inner:#}");
    }
    auth_error_response(err)
}
