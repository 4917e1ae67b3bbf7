use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{anyhow, Result};
use secrecy::SecretString;

/// Build the action to execute from the parsed arguments
///
/// # Errors
///
/// Returns an error if a required argument is missing
pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let provider_url = matches
        .get_one("provider-url")
        .map(|s: &String| s.to_string())
        .ok_or_else(|| anyhow!("missing required argument: --provider-url"))?;

    let provider_key = matches
        .get_one("provider-key")
        .map(|s: &String| SecretString::from(s.as_str()))
        .ok_or_else(|| anyhow!("missing required argument: --provider-key"))?;

    let site_url = matches.get_one("site-url").map_or_else(
        || "http://localhost:8080".to_string(),
        |s: &String| s.to_string(),
    );

    let globals = GlobalArgs::new(provider_url, provider_key, site_url);

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
    };

    Ok((action, globals))
}
