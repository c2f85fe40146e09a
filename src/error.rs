// src/error.rs

use thiserror::Error;

/// Failure of an external collaborator (object store, OCR, vision model,
/// text generation, warehouse).
///
/// Nothing in the intake layer propagates these to the HTTP caller; each call
/// site logs the error and picks its own fallback.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The service answered, but not with anything we can use.
    #[error("{service} returned an unusable response: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },

    /// Credentials or endpoint missing; no call was attempted.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// The document has no text layer to read.
    #[error("document has no extractable text")]
    NoText,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("warehouse error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl DependencyError {
    pub(crate) fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| DependencyError::Transport { service, source }
    }

    pub(crate) fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        DependencyError::Malformed {
            service,
            detail: detail.into(),
        }
    }
}

/// Errors raised while loading the TOML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
