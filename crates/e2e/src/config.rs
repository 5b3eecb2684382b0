//! Harness configuration
//!
//! Settings come from an optional YAML file and are then overridden by
//! `BMC_*` environment variables. Nothing about the target BMC is hardcoded
//! in the harness itself; the defaults match a local QEMU OpenBMC image.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::poll::PollOptions;
use crate::redfish::AcceptedStatuses;

pub const ENV_BASE_URL: &str = "BMC_BASE_URL";
pub const ENV_USERNAME: &str = "BMC_USERNAME";
pub const ENV_PASSWORD: &str = "BMC_PASSWORD";
pub const ENV_VERIFY_TLS: &str = "BMC_VERIFY_TLS";
pub const ENV_REQUEST_TIMEOUT: &str = "BMC_REQUEST_TIMEOUT_SECS";
pub const ENV_POWER_TIMEOUT: &str = "BMC_POWER_TIMEOUT_SECS";
pub const ENV_POWER_POLL: &str = "BMC_POWER_POLL_SECS";
pub const ENV_RESET_ACCEPTED: &str = "BMC_RESET_ACCEPTED";
pub const ENV_LOCKOUT_ATTEMPTS: &str = "BMC_LOCKOUT_ATTEMPTS";
pub const ENV_LOCKOUT_USERNAME: &str = "BMC_LOCKOUT_USERNAME";
pub const ENV_LOCKOUT_PASSWORD: &str = "BMC_LOCKOUT_PASSWORD";
pub const ENV_EXPECT_LOCKOUT: &str = "BMC_EXPECT_LOCKOUT";

/// Login credentials for the Redfish session service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection and scenario settings for a BMC under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BmcConfig {
    /// Scheme, host and port of the BMC, without a trailing slash
    pub base_url: String,

    /// Account used to open sessions
    pub credentials: Credentials,

    /// Verify the server certificate (BMCs usually ship self-signed ones)
    pub verify_tls: bool,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// How long to wait for a power transition
    pub power_timeout_secs: u64,

    /// Delay between power state polls
    pub power_poll_interval_secs: u64,

    /// Status codes accepted from the ComputerSystem.Reset action
    pub reset_accepted: Vec<u16>,

    /// Failed logins issued before the lockout probe
    pub lockout_attempts: usize,

    /// Account used for the lockout probe; falls back to `credentials`
    pub lockout_credentials: Option<Credentials>,

    /// Required lockout behaviour; `None` only records what the server does
    pub expect_lockout: Option<bool>,
}

impl Default for BmcConfig {
    fn default() -> Self {
        Self {
            base_url: "https://127.0.0.1:2443".to_string(),
            credentials: Credentials::new("root", "0penBmc"),
            verify_tls: false,
            request_timeout_secs: 30,
            power_timeout_secs: 60,
            power_poll_interval_secs: 5,
            reset_accepted: vec![200, 202, 204],
            lockout_attempts: 3,
            lockout_credentials: None,
            expect_lockout: None,
        }
    }
}

impl BmcConfig {
    /// Load configuration from the process environment over the defaults
    pub fn from_env() -> E2eResult<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load a YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a YAML configuration file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()
    }

    /// Apply `BMC_*` overrides resolved through `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.credentials.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.credentials.password = password;
        }
        if let Some(value) = lookup(ENV_VERIFY_TLS) {
            self.verify_tls = parse_bool(ENV_VERIFY_TLS, &value)?;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = parse_number(ENV_REQUEST_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_POWER_TIMEOUT) {
            self.power_timeout_secs = parse_number(ENV_POWER_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_POWER_POLL) {
            self.power_poll_interval_secs = parse_number(ENV_POWER_POLL, &value)?;
        }
        if let Some(value) = lookup(ENV_RESET_ACCEPTED) {
            self.reset_accepted = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_number(ENV_RESET_ACCEPTED, s))
                .collect::<E2eResult<Vec<u16>>>()?;
        }
        if let Some(value) = lookup(ENV_LOCKOUT_ATTEMPTS) {
            self.lockout_attempts = parse_number(ENV_LOCKOUT_ATTEMPTS, &value)?;
        }
        if let Some(username) = lookup(ENV_LOCKOUT_USERNAME) {
            let password = lookup(ENV_LOCKOUT_PASSWORD).unwrap_or_default();
            self.lockout_credentials = Some(Credentials::new(username, password));
        }
        if let Some(value) = lookup(ENV_EXPECT_LOCKOUT) {
            self.expect_lockout = Some(parse_bool(ENV_EXPECT_LOCKOUT, &value)?);
        }
        self.validate()
    }

    /// Check invariants and normalise the base URL
    pub fn validate(mut self) -> E2eResult<Self> {
        let trimmed = self.base_url.trim().trim_end_matches('/').to_string();
        let url = Url::parse(&trimmed).map_err(|e| E2eError::InvalidUrl {
            url: trimmed.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(E2eError::InvalidUrl {
                url: trimmed,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        self.base_url = trimmed;

        if self.credentials.username.is_empty() {
            return Err(E2eError::InvalidConfig("username must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(E2eError::InvalidConfig("request timeout must be non-zero".into()));
        }
        if self.power_poll_interval_secs == 0 {
            return Err(E2eError::InvalidConfig("power poll interval must be non-zero".into()));
        }
        // Fails on an empty list or out-of-range codes.
        self.reset_accepted_statuses()?;
        Ok(self)
    }

    /// Credentials for the lockout probe
    pub fn lockout_credentials(&self) -> &Credentials {
        self.lockout_credentials.as_ref().unwrap_or(&self.credentials)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn power_poll_options(&self) -> PollOptions {
        PollOptions::new(
            Duration::from_secs(self.power_timeout_secs),
            Duration::from_secs(self.power_poll_interval_secs),
        )
    }

    pub fn reset_accepted_statuses(&self) -> E2eResult<AcceptedStatuses> {
        if self.reset_accepted.is_empty() {
            return Err(E2eError::InvalidConfig(
                "reset_accepted must list at least one status".into(),
            ));
        }
        let codes = self
            .reset_accepted
            .iter()
            .map(|code| {
                StatusCode::from_u16(*code).map_err(|_| {
                    E2eError::InvalidConfig(format!("invalid HTTP status in reset_accepted: {}", code))
                })
            })
            .collect::<E2eResult<Vec<_>>>()?;
        Ok(AcceptedStatuses::new(codes))
    }
}

fn parse_bool(key: &str, value: &str) -> E2eResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(E2eError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> E2eResult<T> {
    value.trim().parse().map_err(|_| {
        E2eError::InvalidConfig(format!("{} must be a number, got '{}'", key, value))
    })
}
