use crate::{
    auth::{AuthFlows, Notifier, TracingNotifier},
    cli::globals::GlobalArgs,
    pordisto::handlers::{
        health, health::__path_health, login, login::__path_login, logout, logout::__path_logout,
        register, register::__path_register, reset_password, reset_password::__path_reset_password,
        session, session::__path_session, update_password, update_password::__path_update_password,
    },
    provider::{AuthEvent, ProviderClient, RedirectState},
    ratelimit::{RateLimitConfig, SlidingWindowLimiter},
    session::SessionKeeper,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
pub mod headers;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        login,
        register,
        reset_password,
        update_password,
        logout,
        session
    ),
    components(schemas(
        handlers::FlowResponse,
        health::Health,
        login::LoginRequest,
        register::RegisterRequest,
        reset_password::ResetPasswordRequest,
        update_password::UpdatePasswordRequest,
        session::SessionStatus
    )),
    tags(
        (name = "auth", description = "Session and authentication API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router. Split out of [`new`] so tests can drive it
/// without binding a socket.
#[must_use]
pub fn router(
    provider: Arc<ProviderClient>,
    flows: Arc<AuthFlows>,
    limiter: Arc<SlidingWindowLimiter>,
    redirects: Arc<RedirectState>,
) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let app = Router::new()
        .route("/", get(|| async { "🚪" }))
        .route("/auth/login", post(handlers::login))
        .route("/auth/register", post(handlers::register))
        .route("/auth/reset-password", post(handlers::reset_password))
        .route("/auth/update-password", post(handlers::update_password))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/session", get(handlers::session))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(provider))
                .layer(Extension(flows))
                .layer(Extension(limiter))
                .layer(Extension(redirects)),
        )
        .route("/health", get(handlers::health).options(handlers::health));

    headers::security_headers(app)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, globals: &GlobalArgs) -> Result<()> {
    let provider = Arc::new(ProviderClient::new(
        &globals.provider_url,
        globals.provider_key.clone(),
    )?);

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let flows = Arc::new(AuthFlows::new(
        provider.clone(),
        notifier,
        globals.site_url.clone(),
    ));

    let limiter = Arc::new(SlidingWindowLimiter::new(RateLimitConfig::default()));
    let redirects = Arc::new(RedirectState::new());

    // Keep the provider session alive for the lifetime of the server.
    let keeper = SessionKeeper::new(provider.clone(), redirects.clone());

    let mut events = provider.subscribe();
    tokio::spawn({
        let keeper = keeper.clone();
        let redirects = redirects.clone();

        async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if matches!(event, AuthEvent::SignedIn(_)) {
                            // A fresh sign-in clears any pending redirect.
                            redirects.clear();
                        }
                        keeper.handle_auth_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });

    keeper.prime().await?;

    let app = router(provider, flows, limiter, redirects);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            keeper.shutdown();
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
