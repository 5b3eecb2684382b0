//! Error types for the Redfish harness

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Authentication failed with status {status}: {body}")]
    Authentication { status: StatusCode, body: String },

    #[error("Authentication response is missing the {header} header")]
    MissingHeader { header: &'static str },

    #[error("HTTP {method} {url} returned {status}: {body}")]
    Http {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Timeout waiting for {what} after {elapsed:?} ({attempts} attempts), last observed: {last_observed}")]
    Timeout {
        what: String,
        elapsed: Duration,
        attempts: usize,
        last_observed: String,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl E2eError {
    /// True for login failures, including a 201 without the session headers.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            E2eError::Authentication { .. } | E2eError::MissingHeader { .. }
        )
    }

    /// Status code carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            E2eError::Authentication { status, .. } | E2eError::Http { status, .. } => Some(*status),
            E2eError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
