use crate::{
    auth::AuthFlows,
    pordisto::handlers::{valid_email, FlowResponse},
    ratelimit::SlidingWindowLimiter,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = FlowResponse, content_type = "application/json"),
        (status = 401, description = "Invalid credentials", body = FlowResponse),
        (status = 429, description = "Too many login attempts"),
    ),
    tag = "auth"
)]
#[instrument(skip(flows, limiter, payload))]
pub async fn login(
    flows: Extension<Arc<AuthFlows>>,
    limiter: Extension<Arc<SlidingWindowLimiter>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    debug!("login request: {:?}", request);

    if !valid_email(&request.email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    // Attempts are keyed by email so one account being hammered does not
    // lock out everyone behind the same address.
    if limiter.is_rate_limited(&request.email) {
        let retry_after = limiter.time_until_reset(&request.email);

        warn!(email = %request.email, "Login rate limited");

        let mut headers = HeaderMap::new();
        if let Ok(value) = retry_after.as_secs().to_string().parse() {
            headers.insert("Retry-After", value);
        }

        return (
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            "Too many login attempts".to_string(),
        )
            .into_response();
    }

    let outcome = flows.login(&request.email, &request.password).await;

    let status = if outcome.success {
        // A successful login restores the full attempt budget.
        limiter.clear(&request.email);
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };

    (status, Json(FlowResponse::from(outcome))).into_response()
}
