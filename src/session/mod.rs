//! Session keeping: proactive renewal of the provider session.
//!
//! The keeper arms one renewal task per active session. The task sleeps until
//! 75% of the reported lifetime has elapsed, refreshes the session and keeps
//! looping on success. A failed renewal is terminal for the chain: the only
//! recovery is a redirect to `/login` and full re-authentication.

use crate::provider::{AuthEvent, Session};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Renew once this share of the session lifetime has elapsed. Policy
/// constant, deliberately not configurable.
const RENEW_AT_PERCENT: u64 = 75;

const LOGIN_PATH: &str = "/login";

/// Where renewed sessions come from. The server wires the provider client in
/// here; tests use scripted mocks.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn refresh_session(&self) -> Result<Session>;
    async fn current_session(&self) -> Result<Option<Session>>;
}

/// Navigation side effects of the keeper. In a browser this would be
/// `window.location`; the server records the redirect target instead.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn redirect(&self, path: &str);
}

/// Owns the single pending renewal task. Arming always cancels the previous
/// task first, so at most one timer is ever alive.
#[derive(Debug, Default)]
pub struct RefreshTimer {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    pub fn cancel_if_present(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn arm(&mut self, handle: JoinHandle<()>) {
        self.cancel_if_present();
        self.handle = Some(handle);
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel_if_present();
    }
}

/// Watches auth state transitions and keeps the session alive.
pub struct SessionKeeper {
    source: Arc<dyn SessionSource>,
    navigator: Arc<dyn Navigator>,
    timer: Mutex<RefreshTimer>,
    authenticated: AtomicBool,
}

impl SessionKeeper {
    #[must_use]
    pub fn new(source: Arc<dyn SessionSource>, navigator: Arc<dyn Navigator>) -> Arc<Self> {
        Arc::new(Self {
            source,
            navigator,
            timer: Mutex::new(RefreshTimer::default()),
            authenticated: AtomicBool::new(false),
        })
    }

    /// Startup check: a session may already exist (restart with a persisted
    /// provider session), in which case the sign-in event was never observed
    /// and the renewal chain must be primed here.
    ///
    /// # Errors
    /// Returns an error if the session source fails to report.
    pub async fn prime(self: &Arc<Self>) -> Result<()> {
        if let Some(session) = self.source.current_session().await? {
            info!(
                expires_in = session.expires_in,
                "Existing session found, priming renewal"
            );
            self.authenticated.store(true, Ordering::SeqCst);
            self.schedule_renewal(session.expires_in);
        }

        Ok(())
    }

    pub fn handle_auth_event(self: &Arc<Self>, event: &AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) => {
                self.authenticated.store(true, Ordering::SeqCst);
                self.schedule_renewal(session.expires_in);
            }
            AuthEvent::SignedOut => {
                self.authenticated.store(false, Ordering::SeqCst);
                self.cancel();
                debug!("Signed out, renewal cancelled");
            }
        }
    }

    /// Arm the renewal loop for a session with `expires_in` seconds left.
    /// Supersedes any pending renewal.
    pub fn schedule_renewal(self: &Arc<Self>, expires_in: u64) {
        if expires_in == 0 {
            warn!("Session lifetime is zero, not scheduling renewal");
            return;
        }

        let keeper = Arc::clone(self);

        let handle = tokio::spawn(async move {
            keeper.renewal_loop(expires_in).await;
        });

        lock_timer(&self.timer).arm(handle);
    }

    /// Cancel any pending renewal without touching the authenticated flag.
    pub fn cancel(&self) {
        lock_timer(&self.timer).cancel_if_present();
    }

    /// Owning-context teardown.
    pub fn shutdown(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
        self.cancel();
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        lock_timer(&self.timer).is_armed()
    }

    async fn renewal_loop(self: Arc<Self>, initial_expires_in: u64) {
        let mut expires_in = initial_expires_in;

        loop {
            let renew_in = Duration::from_secs(expires_in * RENEW_AT_PERCENT / 100);
            debug!(next_renew_seconds = renew_in.as_secs(), "Renewal armed");

            sleep(renew_in).await;

            match self.source.refresh_session().await {
                Ok(session) => {
                    // Sign-out may have lost the race with an in-flight
                    // refresh; its result must not re-arm the chain.
                    if !self.authenticated.load(Ordering::SeqCst) {
                        debug!("Renewal completed after sign-out, dropping result");
                        return;
                    }

                    info!(expires_in = session.expires_in, "Session renewed");

                    if session.expires_in == 0 {
                        warn!("Renewed session has zero lifetime, stopping renewal");
                        return;
                    }

                    expires_in = session.expires_in;
                }

                Err(e) => {
                    error!("Failed to renew session: {}", e);

                    if !self.authenticated.load(Ordering::SeqCst) {
                        return;
                    }

                    // Sole recovery path: force a fresh login, unless the
                    // user is already there.
                    if !self.navigator.current_path().contains(LOGIN_PATH) {
                        self.navigator.redirect(LOGIN_PATH);
                    }

                    return;
                }
            }
        }
    }
}

impl Drop for SessionKeeper {
    fn drop(&mut self) {
        lock_timer(&self.timer).cancel_if_present();
    }
}

fn lock_timer(timer: &Mutex<RefreshTimer>) -> std::sync::MutexGuard<'_, RefreshTimer> {
    timer.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
