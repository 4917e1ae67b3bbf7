use crate::provider::{ProviderClient, RedirectState};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionStatus {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionStatus, content_type = "application/json"),
        (status = 204, description = "No active session"),
        (status = 401, description = "Session unrecoverable, re-login required", body = SessionStatus),
    ),
    tag = "auth"
)]
#[instrument(skip(provider, redirects))]
pub async fn session(
    provider: Extension<Arc<ProviderClient>>,
    redirects: Extension<Arc<RedirectState>>,
) -> impl IntoResponse {
    // A recorded redirect means the keeper gave up on renewal; the stored
    // session (if any) is stale.
    if let Some(target) = redirects.target() {
        let status = SessionStatus {
            authenticated: false,
            expires_in: None,
            redirect: Some(target),
        };
        return (StatusCode::UNAUTHORIZED, Json(status)).into_response();
    }

    match provider.get_session() {
        Some(session) => {
            let status = SessionStatus {
                authenticated: true,
                expires_in: Some(session.expires_in),
                redirect: None,
            };
            (StatusCode::OK, Json(status)).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
