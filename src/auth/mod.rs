//! Auth flows: login, registration, password recovery, password update and
//! logout against the provider, with catch-at-the-boundary error surfacing.
//!
//! Nothing here propagates an error to the caller; every flow returns a
//! [`FlowOutcome`] and pushes a human-readable notice to the configured
//! [`Notifier`].

use crate::provider::ProviderClient;
use std::sync::Arc;
use tracing::{error, info, instrument};

const GENERIC_ERROR: &str = "An unexpected error occurred";

/// Structured result of an auth flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl FlowOutcome {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing notification, the toast contract: fire-and-forget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub description: String,
    pub level: NoticeLevel,
}

impl Notice {
    #[must_use]
    pub fn success(description: &str) -> Self {
        Self {
            title: "Success",
            description: description.to_string(),
            level: NoticeLevel::Success,
        }
    }

    #[must_use]
    pub fn error(description: String) -> Self {
        Self {
            title: "Error",
            description,
            level: NoticeLevel::Error,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default sink: notices go to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => info!("{}: {}", notice.title, notice.description),
            NoticeLevel::Error => error!("{}: {}", notice.title, notice.description),
        }
    }
}

pub struct AuthFlows {
    provider: Arc<ProviderClient>,
    notifier: Arc<dyn Notifier>,
    /// Base URL of the site the provider redirects back to after recovery.
    site_url: String,
}

impl AuthFlows {
    #[must_use]
    pub fn new(
        provider: Arc<ProviderClient>,
        notifier: Arc<dyn Notifier>,
        site_url: String,
    ) -> Self {
        Self {
            provider,
            notifier,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> FlowOutcome {
        match self.provider.sign_in_with_password(email, password).await {
            Ok(_) => FlowOutcome::ok(),
            Err(e) => self.fail(&e),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> FlowOutcome {
        match self.provider.sign_up(email, password).await {
            Ok(_) => {
                self.notifier.notify(Notice::success(
                    "Registration successful. Please check your email for verification.",
                ));
                FlowOutcome::ok()
            }
            Err(e) => self.fail(&e),
        }
    }

    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> FlowOutcome {
        let redirect_to = format!("{}/update-password", self.site_url);

        match self
            .provider
            .reset_password_for_email(email, &redirect_to)
            .await
        {
            Ok(()) => {
                self.notifier.notify(Notice::success(
                    "Password reset link has been sent to your email.",
                ));
                FlowOutcome::ok()
            }
            Err(e) => self.fail(&e),
        }
    }

    #[instrument(skip(self, new_password))]
    pub async fn update_password(&self, new_password: &str) -> FlowOutcome {
        match self.provider.update_user_password(new_password).await {
            Ok(()) => {
                self.notifier.notify(Notice::success(
                    "Your password has been updated successfully.",
                ));
                FlowOutcome::ok()
            }
            Err(e) => self.fail(&e),
        }
    }

    #[instrument(skip(self))]
    pub async fn logout(&self) -> FlowOutcome {
        match self.provider.sign_out().await {
            Ok(()) => FlowOutcome::ok(),
            Err(e) => self.fail(&e),
        }
    }

    fn fail(&self, e: &anyhow::Error) -> FlowOutcome {
        let message = error_message(e);
        self.notifier.notify(Notice::error(message.clone()));
        FlowOutcome::failed(message)
    }
}

/// Extract a message defensively; an empty one falls back to a generic text.
fn error_message(e: &anyhow::Error) -> String {
    let message = e.to_string();
    if message.trim().is_empty() {
        GENERIC_ERROR.to_string()
    } else {
        message
    }
}
