//! HTTP client for the identity provider's auth API.
//!
//! The provider owns credential verification, token issuance and session
//! storage; this client only translates calls and keeps the current session
//! in local memory, feeding auth state transitions to subscribers.

use crate::session::{Navigator, SessionSource};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};
use url::Url;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Size of the auth event backlog; slow subscribers miss old transitions.
const EVENT_CAPACITY: usize = 16;

/// Provider-issued credential with a finite validity lifetime.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Remaining validity in seconds at time of issue.
    pub expires_in: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Auth state transitions observed by this client.
#[derive(Clone, Debug)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
}

/// Client for a `GoTrue`-style auth API.
pub struct ProviderClient {
    base_url: String,
    api_key: SecretString,
    client: Client,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl ProviderClient {
    /// # Errors
    /// Returns an error if the base URL cannot be parsed or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self> {
        // Validate early so a bad URL fails at startup, not on first login.
        Url::parse(base_url)?;

        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            session: RwLock::new(None),
            events,
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Local session lookup, no network round-trip.
    #[must_use]
    pub fn get_session(&self) -> Option<Session> {
        read_session(&self.session).clone()
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<String> {
        let url = Url::parse(&self.base_url)?;

        let scheme = url.scheme();

        let host = url
            .host()
            .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
            .to_owned();

        let port = match url.port() {
            Some(p) => p,
            None => match scheme {
                "http" => 80,
                "https" => 443,
                _ => return Err(anyhow!("Error parsing URL: unsupported scheme {}", scheme)),
            },
        };

        Ok(format!("{scheme}://{host}:{port}{endpoint}"))
    }

    fn with_api_key(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", self.api_key.expose_secret())
    }

    fn bearer_token(&self) -> Result<String> {
        read_session(&self.session)
            .as_ref()
            .map(|session| session.access_token.clone())
            .ok_or_else(|| anyhow!("No active session"))
    }

    fn store_session(&self, session: Session) {
        let mut guard = write_session(&self.session);
        *guard = Some(session);
    }

    /// Sign in with email and password. Stores the session and emits
    /// `SignedIn` on success.
    ///
    /// # Errors
    /// Returns the provider's error on rejected credentials or transport
    /// failure.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.endpoint_url("/auth/v1/token?grant_type=password")?;

        let payload = json!({
            "email": email,
            "password": password,
        });

        let response = self
            .with_api_key(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;

        let session = parse_session(&url, response).await?;

        self.store_session(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));

        Ok(session)
    }

    /// Register a new user. The provider only returns a session when email
    /// confirmation is disabled; otherwise the account is pending.
    ///
    /// # Errors
    /// Returns the provider's error (e.g. user already exists).
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let url = self.endpoint_url("/auth/v1/signup")?;

        let payload = json!({
            "email": email,
            "password": password,
        });

        let response = self
            .with_api_key(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(&url, response).await);
        }

        let body: Value = response.json().await?;

        // Auto-confirm deployments return the session inline.
        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body)?;
            self.store_session(session.clone());
            let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
            return Ok(Some(session));
        }

        debug!("Sign-up accepted, confirmation pending");

        Ok(None)
    }

    /// Request a password-recovery email. `redirect_to` is where the
    /// provider sends the user after following the link.
    ///
    /// # Errors
    /// Returns the provider's error on rejection or transport failure.
    #[instrument(skip(self))]
    pub async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()> {
        let url = self.endpoint_url("/auth/v1/recover")?;

        let payload = json!({
            "email": email,
        });

        let response = self
            .with_api_key(self.client.post(&url))
            .query(&[("redirect_to", redirect_to)])
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(&url, response).await);
        }

        Ok(())
    }

    /// Update the authenticated user's password.
    ///
    /// # Errors
    /// Returns an error when no session is active or the provider rejects
    /// the update.
    #[instrument(skip(self, new_password))]
    pub async fn update_user_password(&self, new_password: &str) -> Result<()> {
        let token = self.bearer_token()?;
        let url = self.endpoint_url("/auth/v1/user")?;

        let payload = json!({
            "password": new_password,
        });

        let response = self
            .with_api_key(self.client.put(&url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(&url, response).await);
        }

        Ok(())
    }

    /// Exchange the stored refresh token for a new session.
    ///
    /// # Errors
    /// Returns an error when no session is active or the provider rejects
    /// the refresh token.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> Result<Session> {
        let refresh_token = read_session(&self.session)
            .as_ref()
            .map(|session| session.refresh_token.clone())
            .ok_or_else(|| anyhow!("No active session"))?;

        let url = self.endpoint_url("/auth/v1/token?grant_type=refresh_token")?;

        let payload = json!({
            "refresh_token": refresh_token,
        });

        let response = self
            .with_api_key(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;

        let session = parse_session(&url, response).await?;

        self.store_session(session.clone());

        Ok(session)
    }

    /// Sign out. The local session is always cleared and `SignedOut`
    /// emitted, even when the upstream revocation fails; the error is still
    /// reported so callers can surface it.
    ///
    /// # Errors
    /// Returns the provider's error when revocation fails upstream.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let token = self.bearer_token()?;
        let url = self.endpoint_url("/auth/v1/logout")?;

        let result = self
            .with_api_key(self.client.post(&url))
            .bearer_auth(token)
            .send()
            .await;

        {
            let mut guard = write_session(&self.session);
            *guard = None;
        }
        let _ = self.events.send(AuthEvent::SignedOut);

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("Upstream sign-out failed, local session cleared anyway");
                Err(provider_error(&url, response).await)
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Upstream sign-out unreachable, local session cleared anyway");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl SessionSource for ProviderClient {
    async fn refresh_session(&self) -> Result<Session> {
        Self::refresh_session(self).await
    }

    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.get_session())
    }
}

async fn parse_session(url: &str, response: Response) -> Result<Session> {
    if !response.status().is_success() {
        return Err(provider_error(url, response).await);
    }

    let session: Session = response.json().await?;

    Ok(session)
}

/// Build an error out of the provider's response body, defensively: the body
/// may carry `error_description`, `msg`, `error`, or nothing parseable.
async fn provider_error(url: &str, response: Response) -> anyhow::Error {
    let status = response.status();
    let detail = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| {
            ["error_description", "msg", "error"]
                .iter()
                .find_map(|field| body[field].as_str().map(str::to_string))
        })
        .unwrap_or_default();

    anyhow!("{} - {}, {}", url, status, detail)
}

/// Record-only navigator for headless contexts: the redirect target is kept
/// for the HTTP surface to report instead of driving a browser.
#[derive(Debug, Default)]
pub struct RedirectState {
    current_path: RwLock<String>,
    target: RwLock<Option<String>>,
}

impl RedirectState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_path: RwLock::new("/".to_string()),
            target: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<String> {
        self.target
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        let mut guard = self
            .target
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }
}

impl Navigator for RedirectState {
    fn current_path(&self) -> String {
        self.current_path
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, path: &str) {
        warn!(path, "Session unrecoverable, recording redirect");
        let mut guard = self
            .target
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(path.to_string());
    }
}

fn read_session(
    session: &RwLock<Option<Session>>,
) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
    session.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_session(
    session: &RwLock<Option<Session>>,
) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
    session.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}
