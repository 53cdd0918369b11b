//! Environment variable names used by this crate for convenient
//! configuration of sinks from services.
//!
//! These are purely helpers; the enricher and handler never read the
//! environment themselves.

/// Access token for the error-tracking item API.
pub const PERSON_CONTEXT_ACCESS_TOKEN_ENV: &str = "PERSON_CONTEXT_ACCESS_TOKEN";

/// Item API endpoint, overriding the default public endpoint.
pub const PERSON_CONTEXT_ENDPOINT_ENV: &str = "PERSON_CONTEXT_ENDPOINT";

/// Deployment environment reported with every item.
pub const PERSON_CONTEXT_ENVIRONMENT_ENV: &str = "PERSON_CONTEXT_ENVIRONMENT";

/// Full backend DSN, see [`crate::backend::parse_dsn`].
pub const PERSON_CONTEXT_DSN_ENV: &str = "PERSON_CONTEXT_DSN";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
