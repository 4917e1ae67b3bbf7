pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::login;

pub mod register;
pub use self::register::register;

pub mod reset_password;
pub use self::reset_password::reset_password;

pub mod update_password;
pub use self::update_password::update_password;

pub mod logout;
pub use self::logout::logout;

pub mod session;
pub use self::session::session;

// common functions and types for the handlers
use crate::auth::FlowOutcome;
use regex::Regex;
use serde::Serialize;
use utoipa::ToSchema;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= 8
}

/// Wire shape of a flow outcome.
#[derive(ToSchema, Serialize, Debug)]
pub struct FlowResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<FlowOutcome> for FlowResponse {
    fn from(outcome: FlowOutcome) -> Self {
        Self {
            success: outcome.success,
            error: outcome.error,
        }
    }
}
