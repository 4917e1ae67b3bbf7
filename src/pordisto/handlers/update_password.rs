use crate::{
    auth::AuthFlows,
    pordisto::handlers::{valid_password, FlowResponse},
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

#[derive(ToSchema, Serialize, Deserialize)]
pub struct UpdatePasswordRequest {
    password: String,
}

impl std::fmt::Debug for UpdatePasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePasswordRequest")
            .field("password", &"***")
            .finish()
    }
}

#[utoipa::path(
    post,
    path = "/auth/update-password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = FlowResponse, content_type = "application/json"),
        (status = 400, description = "Invalid password"),
        (status = 401, description = "No active session", body = FlowResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(flows, payload))]
pub async fn update_password(
    flows: Extension<Arc<AuthFlows>>,
    payload: Option<Json<UpdatePasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if !valid_password(&request.password) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    let outcome = flows.update_password(&request.password).await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };

    (status, Json(FlowResponse::from(outcome))).into_response()
}
