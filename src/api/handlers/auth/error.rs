//! Error taxonomy for the login boundary.
//!
//! Every variant except `Internal` is recoverable at the login boundary and
//! maps to a distinct user-visible reason; callers key messaging off the
//! kind, so variants are never collapsed into a generic failure.

use axum::http::StatusCode;
use std::fmt;

#[derive(Debug)]
pub enum AuthError {
    /// Challenge token is unknown, expired, or already consumed.
    ChallengeInvalid,
    /// Submit attempted without a verified challenge token.
    ChallengeRequired,
    InvalidCredentials,
    AccountLocked,
    AccountDeleted,
    /// Provisioning was cancelled; no account was created.
    ProvisioningAborted,
    /// The identity provider rejected or failed the token exchange.
    ProviderExchangeFailed,
    /// Store or transport fault; logged server-side, never shown verbatim.
    Internal(anyhow::Error),
}

impl AuthError {
    /// User-visible reason for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ChallengeInvalid => "Challenge verification failed",
            Self::ChallengeRequired => "Challenge required",
            Self::InvalidCredentials => "Invalid username or password",
            Self::AccountLocked => "Account is locked",
            Self::AccountDeleted => "Account has been deleted",
            Self::ProvisioningAborted => "Provisioning was cancelled",
            Self::ProviderExchangeFailed => "Identity provider exchange failed",
            Self::Internal(_) => "Authentication failed",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(err) => write!(f, "internal error: {err}"),
            other => f.write_str(other.user_message()),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Map an `AuthError` to an HTTP response for the auth handlers.
///
/// Internal faults are logged at the call site; only the generic message
/// leaves the process.
pub(super) fn auth_error_response(err: &AuthError) -> (StatusCode, String) {
    let status = match err {
        AuthError::ChallengeInvalid | AuthError::ChallengeRequired => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::AccountLocked => StatusCode::FORBIDDEN,
        AuthError::AccountDeleted => StatusCode::GONE,
        AuthError::ProvisioningAborted => StatusCode::CONFLICT,
        AuthError::ProviderExchangeFailed => StatusCode::BAD_GATEWAY,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.user_message().to_string())
}
