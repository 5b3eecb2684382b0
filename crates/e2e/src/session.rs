//! Token sessions against the Redfish SessionService
//!
//! A [`Session`] owns one server-side session resource. It is deleted when
//! the session is released or dropped, whichever comes first, so a failing
//! assertion in a test body still tears it down. Teardown failures are
//! logged and swallowed.

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::{BmcConfig, Credentials};
use crate::error::{E2eError, E2eResult};
use crate::redfish::{build_client, AUTH_TOKEN_HEADER, SESSIONS_PATH};

#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "UserName")]
    username: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

/// Raw outcome of a login POST, before any interpretation
#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub status: StatusCode,
    pub token: Option<String>,
    pub location: Option<String>,
    pub body: String,
}

/// Outcome of an action POST
#[derive(Debug, Clone)]
pub struct ActionResponse {
    pub url: String,
    pub status: StatusCode,
    pub body: String,
}

/// POST credentials to the session service and report what came back
pub fn login(client: &Client, base_url: &str, credentials: &Credentials) -> E2eResult<LoginResponse> {
    let url = format!("{}{}", base_url, SESSIONS_PATH);
    debug!("POST {} as {}", url, credentials.username);

    let resp = client
        .post(&url)
        .json(&LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        })
        .send()?;

    let status = resp.status();
    let token = header_value(&resp, AUTH_TOKEN_HEADER);
    let location = header_value(&resp, "Location");
    let body = resp.text().unwrap_or_default();

    Ok(LoginResponse {
        status,
        token,
        location,
        body,
    })
}

fn header_value(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Open a session using the configured endpoint and credentials
pub fn acquire_session(config: &BmcConfig) -> E2eResult<Session> {
    Session::acquire(config)
}

/// Delete the server-side session; never fails
pub fn release_session(session: &mut Session) {
    session.release();
}

/// An authenticated Redfish session
pub struct Session {
    client: Client,
    base_url: String,
    auth_token: String,
    location: String,
    released: bool,
}

impl Session {
    /// Build a client from `config` and log in
    pub fn acquire(config: &BmcConfig) -> E2eResult<Self> {
        let client = build_client(config.verify_tls, config.request_timeout())?;
        Self::acquire_with(client, &config.base_url, &config.credentials)
    }

    /// Log in with an existing client. Only HTTP 201 counts as success.
    pub fn acquire_with(client: Client, base_url: &str, credentials: &Credentials) -> E2eResult<Self> {
        info!("Opening session for '{}' at {}", credentials.username, base_url);
        let resp = login(&client, base_url, credentials)?;
        Self::from_login(client, base_url, resp)
    }

    /// Turn a raw login response into a session, enforcing the 201 contract
    pub fn from_login(client: Client, base_url: &str, resp: LoginResponse) -> E2eResult<Self> {
        if resp.status != StatusCode::CREATED {
            error!("Authentication failed ({}): {}", resp.status, resp.body);
            return Err(E2eError::Authentication {
                status: resp.status,
                body: resp.body,
            });
        }

        let Some(auth_token) = resp.token else {
            error!("Login returned 201 without {}", AUTH_TOKEN_HEADER);
            return Err(E2eError::MissingHeader {
                header: AUTH_TOKEN_HEADER,
            });
        };
        let Some(location) = resp.location else {
            error!("Login returned 201 without Location; the session cannot be deleted");
            return Err(E2eError::MissingHeader { header: "Location" });
        };

        info!("Session created: {}", location);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            location,
            released: false,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Server-issued path of the session resource
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Absolute URL for a server path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Authenticated GET; non-2xx responses become [`E2eError::Http`]
    pub fn get_resource(&self, path: &str) -> E2eResult<Value> {
        self.get_json(path)
    }

    /// Authenticated GET decoded into `T`
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> E2eResult<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .header(AUTH_TOKEN_HEADER, &self.auth_token)
            .send()?;
        let body = success_body("GET", &url, resp)?;
        debug!("Response from {}: {}", url, body);
        Ok(serde_json::from_str(&body)?)
    }

    /// Authenticated POST of a JSON payload; the status is returned as-is
    pub fn invoke_action<P: Serialize + ?Sized>(&self, path: &str, payload: &P) -> E2eResult<ActionResponse> {
        let url = self.url(path);
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .header(AUTH_TOKEN_HEADER, &self.auth_token)
            .json(payload)
            .send()?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        info!("Action {} returned {}", path, status);
        Ok(ActionResponse { url, status, body })
    }

    /// Delete the session resource. Runs at most once; errors are logged.
    pub fn release(&mut self) {
        if self.released {
            debug!("Session {} already released", self.location);
            return;
        }
        self.released = true;

        let url = self.url(&self.location);
        match self
            .client
            .delete(&url)
            .header(AUTH_TOKEN_HEADER, &self.auth_token)
            .send()
        {
            Ok(resp) if resp.status().is_success() => {
                info!("Session deleted: {}", self.location);
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().unwrap_or_default();
                error!("Failed to delete session {} ({}): {}", self.location, status, body);
            }
            Err(e) => {
                error!("Failed to delete session {}: {}", self.location, e);
            }
        }
    }

    /// Release now instead of at end of scope
    pub fn close(mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("location", &self.location)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

fn success_body(method: &str, url: &str, resp: Response) -> E2eResult<String> {
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        error!("{} {} returned {}: {}", method, url, status, body);
        return Err(E2eError::Http {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body,
        });
    }
    Ok(body)
}
