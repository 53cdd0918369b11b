use std::sync::Arc;

use crate::env::{env_or, PERSON_CONTEXT_DSN_ENV};
use crate::noop_sink::NoopSink;
use crate::sink::LogSink;
use url::Url;

/// Supported backend kinds that can be selected via DSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Http,
    Noop,
}

/// Backend configuration parsed from a DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Selected backend implementation.
    pub kind: BackendKind,
    /// Raw DSN that was used to construct this config.
    pub dsn: String,
    /// Item endpoint with the credentials stripped (http only).
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
    pub environment: Option<String>,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, dsn: impl Into<String>) -> Self {
        BackendConfig {
            kind,
            dsn: dsn.into(),
            endpoint: None,
            access_token: None,
            environment: None,
        }
    }
}

/// Parse a DSN string and infer the backend kind from its scheme.
///
/// Examples:
/// - "https://TOKEN@api.rollbar.com/api/1/item/"
/// - "http://TOKEN@127.0.0.1:8080/item/?environment=staging"
/// - "noop://"
pub fn parse_dsn(dsn: &str) -> Result<BackendConfig, DsnError> {
    let lower = dsn.to_ascii_lowercase();

    if lower.starts_with("http://") || lower.starts_with("https://") {
        parse_http_dsn(dsn)
    } else if lower.starts_with("noop://") {
        Ok(BackendConfig::new(BackendKind::Noop, dsn))
    } else {
        Err(DsnError::UnknownScheme)
    }
}

fn parse_http_dsn(dsn: &str) -> Result<BackendConfig, DsnError> {
    let mut url = Url::parse(dsn).map_err(|e| match e {
        url::ParseError::EmptyHost => DsnError::MissingHost,
        other => DsnError::Malformed(other),
    })?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(DsnError::MissingHost);
    }
    if url.username().is_empty() {
        return Err(DsnError::MissingToken);
    }
    let token = urlencoding::decode(url.username())
        .map_err(|_| DsnError::InvalidToken)?
        .into_owned();

    let environment = url
        .query_pairs()
        .find(|(key, _)| key == "environment")
        .map(|(_, value)| value.into_owned());

    // Credentials and options stay out of the endpoint we post to.
    url.set_username("").map_err(|_| DsnError::MissingHost)?;
    url.set_password(None).map_err(|_| DsnError::MissingHost)?;
    url.set_query(None);

    Ok(BackendConfig {
        kind: BackendKind::Http,
        dsn: dsn.to_string(),
        endpoint: Some(url.to_string()),
        access_token: Some(token),
        environment,
    })
}

/// Error type returned when parsing a DSN.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,

    #[error("DSN has no access token in its userinfo part")]
    MissingToken,

    #[error("DSN has no host")]
    MissingHost,

    #[error("DSN access token is not valid UTF-8 once decoded")]
    InvalidToken,

    #[error("malformed DSN: {0}")]
    Malformed(url::ParseError),
}

/// Error type returned when building a backend sink from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BackendBuildError {
    #[error("http feature is not enabled")]
    HttpFeatureDisabled,

    #[error(transparent)]
    Dsn(#[from] DsnError),
}

/// Create a concrete `LogSink` implementation from a `BackendConfig`.
pub fn make_sink_from_config(cfg: &BackendConfig) -> Result<Arc<dyn LogSink>, BackendBuildError> {
    match cfg.kind {
        BackendKind::Http => {
            #[cfg(feature = "http")]
            {
                use crate::http::{HttpItemSink, HttpSinkConfig, DEFAULT_ENDPOINT, DEFAULT_ENVIRONMENT};

                let config = HttpSinkConfig {
                    endpoint: cfg.endpoint.clone().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                    access_token: cfg.access_token.clone().ok_or(DsnError::MissingToken)?,
                    environment: cfg
                        .environment
                        .clone()
                        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
                };

                Ok(Arc::new(HttpItemSink::new(config)) as Arc<dyn LogSink>)
            }

            #[cfg(not(feature = "http"))]
            {
                let _ = cfg;
                Err(BackendBuildError::HttpFeatureDisabled)
            }
        }
        BackendKind::Noop => Ok(Arc::new(NoopSink) as Arc<dyn LogSink>),
    }
}

/// Build a sink from the `PERSON_CONTEXT_DSN` environment variable,
/// falling back to a no-op sink when it is unset.
pub fn sink_from_env() -> Result<Arc<dyn LogSink>, BackendBuildError> {
    let dsn = env_or(PERSON_CONTEXT_DSN_ENV, "noop://");
    let cfg = parse_dsn(&dsn)?;
    make_sink_from_config(&cfg)
}
