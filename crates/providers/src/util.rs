//! Shared utility functions for provider adapters.

use sa_domain::config::AuthConfig;
use sa_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the bearer credential for a model from its `AuthConfig`.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    let env_var = auth
        .env
        .as_ref()
        .ok_or_else(|| Error::Config("no auth.env configured for this model".into()))?;
    std::env::var(env_var)
        .map_err(|_| Error::Config(format!("environment variable '{env_var}' not set or not valid UTF-8")))
}
