use crate::{
    auth::AuthFlows,
    pordisto::handlers::{valid_email, FlowResponse},
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    email: String,
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Recovery email requested", body = FlowResponse, content_type = "application/json"),
        (status = 400, description = "Invalid email"),
    ),
    tag = "auth"
)]
#[instrument(skip(flows, payload))]
pub async fn reset_password(
    flows: Extension<Arc<AuthFlows>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if !valid_email(&request.email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let outcome = flows.reset_password(&request.email).await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };

    (status, Json(FlowResponse::from(outcome))).into_response()
}
