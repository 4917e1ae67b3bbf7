use crate::{
    auth::AuthFlows,
    pordisto::handlers::{valid_email, valid_password, FlowResponse},
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
pub struct RegisterRequest {
    email: String,
    password: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = FlowResponse, content_type = "application/json"),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "User already exists", body = FlowResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(flows, payload))]
pub async fn register(
    flows: Extension<Arc<AuthFlows>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    if !valid_email(&request.email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if !valid_password(&request.password) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    let outcome = flows.register(&request.email, &request.password).await;

    let status = if outcome.success {
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    };

    (status, Json(FlowResponse::from(outcome))).into_response()
}
