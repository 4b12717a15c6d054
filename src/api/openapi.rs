//! OpenAPI document for the auth surface.

use utoipa::OpenApi;

use crate::api::handlers::auth::types::{
    ActivateRequest, ActivateResponse, FederatedLoginRequest, LoginRequest,
    ProvisioningPendingResponse, ProvisioningResolveRequest, SessionInfoResponse, SessionResponse,
    TerminationNotice,
};
use crate::api::handlers::auth::{self, TerminationSignal};
use crate::api::handlers::health;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "pasejo",
        description = "Authentication and session orchestration",
        license(name = "BSD-3-Clause")
    ),
    paths(
        auth::login::activate,
        auth::login::login,
        auth::login::login_federated,
        auth::provisioning::provisioning_pending,
        auth::provisioning::provisioning_resolve,
        auth::session::session,
        auth::session::logout,
        health::health,
    ),
    components(schemas(
        ActivateRequest,
        ActivateResponse,
        TerminationNotice,
        TerminationSignal,
        LoginRequest,
        FederatedLoginRequest,
        SessionResponse,
        SessionInfoResponse,
        ProvisioningPendingResponse,
        ProvisioningResolveRequest,
    )),
    tags(
        (name = "auth", description = "Login, provisioning, and session endpoints"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
