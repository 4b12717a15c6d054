use axum::response::IntoResponse;

// Root responds with the service name only; everything useful lives under
// /v1 and /health.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
