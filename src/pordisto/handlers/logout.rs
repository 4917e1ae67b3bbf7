use crate::{auth::AuthFlows, pordisto::handlers::FlowResponse};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Signed out", body = FlowResponse, content_type = "application/json"),
        (status = 502, description = "Upstream revocation failed", body = FlowResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(flows))]
pub async fn logout(flows: Extension<Arc<AuthFlows>>) -> impl IntoResponse {
    let outcome = flows.logout().await;

    // The local session is gone either way; a failure here only means the
    // upstream revocation did not go through.
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };

    (status, Json(FlowResponse::from(outcome)))
}
