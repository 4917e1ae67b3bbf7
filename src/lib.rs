//! Session gateway in front of a password-based identity provider.
//!
//! Keeps the provider session alive by renewing it at 75% of its lifetime,
//! rate limits login attempts, and exposes the auth flows over HTTP.

pub mod auth;
pub mod cli;
pub mod pordisto;
pub mod provider;
pub mod ratelimit;
pub mod session;
