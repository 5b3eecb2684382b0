//! Redfish endpoints and resource types used by the suite

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{E2eError, E2eResult};
use crate::poll::{poll_until, PollOptions};
use crate::session::{ActionResponse, Session};

pub const SESSIONS_PATH: &str = "/redfish/v1/SessionService/Sessions";
pub const SYSTEM_PATH: &str = "/redfish/v1/Systems/system";
pub const RESET_ACTION_PATH: &str = "/redfish/v1/Systems/system/Actions/ComputerSystem.Reset";

/// Session token header, sent on every authenticated request
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Build the blocking HTTP client shared by a session.
///
/// With `verify_tls` off, self-signed BMC certificates are accepted.
pub fn build_client(verify_tls: bool, timeout: Duration) -> E2eResult<Client> {
    if !verify_tls {
        warn!("TLS certificate verification is disabled");
    }
    let client = Client::builder()
        .danger_accept_invalid_certs(!verify_tls)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// `PowerState` of a ComputerSystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    On,
    Off,
    PoweringOn,
    PoweringOff,
    Paused,
    Other(String),
}

impl PowerState {
    pub fn as_str(&self) -> &str {
        match self {
            PowerState::On => "On",
            PowerState::Off => "Off",
            PowerState::PoweringOn => "PoweringOn",
            PowerState::PoweringOff => "PoweringOff",
            PowerState::Paused => "Paused",
            PowerState::Other(s) => s,
        }
    }
}

impl From<String> for PowerState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "On" => PowerState::On,
            "Off" => PowerState::Off,
            "PoweringOn" => PowerState::PoweringOn,
            "PoweringOff" => PowerState::PoweringOff,
            "Paused" => PowerState::Paused,
            _ => PowerState::Other(value),
        }
    }
}

impl From<PowerState> for String {
    fn from(value: PowerState) -> Self {
        match value {
            PowerState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ResetType` values for the ComputerSystem.Reset action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    On,
    ForceOff,
    GracefulShutdown,
    GracefulRestart,
    ForceRestart,
    ForceOn,
    PowerCycle,
    PushPowerButton,
    Nmi,
}

#[derive(Debug, Clone, Serialize)]
struct ResetRequest {
    #[serde(rename = "ResetType")]
    reset_type: ResetType,
}

/// `Status` block shared by Redfish resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ResourceStatus {
    pub state: Option<String>,
    pub health: Option<String>,
    pub health_rollup: Option<String>,
}

/// The `/redfish/v1/Systems/system` document.
///
/// `Status` and `PowerState` are required; everything else is kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemResource {
    #[serde(default)]
    pub id: Option<String>,
    pub status: ResourceStatus,
    pub power_state: PowerState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status codes an action treats as accepted.
///
/// Servers differ on what an accepted asynchronous action returns
/// (200, 202 and 204 are all seen), so callers choose the set per scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedStatuses(Vec<StatusCode>);

impl AcceptedStatuses {
    pub fn new(codes: impl IntoIterator<Item = StatusCode>) -> Self {
        let mut codes: Vec<StatusCode> = codes.into_iter().collect();
        codes.sort();
        codes.dedup();
        Self(codes)
    }

    /// 200, 202 or 204
    pub fn async_action() -> Self {
        Self::new([StatusCode::OK, StatusCode::ACCEPTED, StatusCode::NO_CONTENT])
    }

    pub fn only(code: StatusCode) -> Self {
        Self(vec![code])
    }

    pub fn contains(&self, status: StatusCode) -> bool {
        self.0.contains(&status)
    }

    pub fn codes(&self) -> &[StatusCode] {
        &self.0
    }

    /// Fail with an HTTP error unless the response status is in the set
    pub fn check(&self, response: &ActionResponse) -> E2eResult<()> {
        if self.contains(response.status) {
            return Ok(());
        }
        Err(E2eError::Http {
            method: "POST".to_string(),
            url: response.url.clone(),
            status: response.status,
            body: response.body.clone(),
        })
    }
}

impl fmt::Display for AcceptedStatuses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.0.iter().map(|c| c.as_u16().to_string()).collect();
        f.write_str(&codes.join(", "))
    }
}

/// Read the ComputerSystem resource
pub fn get_system(session: &Session) -> E2eResult<SystemResource> {
    session.get_json(SYSTEM_PATH)
}

/// Post a ComputerSystem.Reset action; the status is left to the caller
pub fn reset_system(session: &Session, reset_type: ResetType) -> E2eResult<ActionResponse> {
    info!("Requesting system reset: {:?}", reset_type);
    session.invoke_action(RESET_ACTION_PATH, &ResetRequest { reset_type })
}

/// Poll the system until it reports `target`
pub fn wait_for_power_state<C: Clock + ?Sized>(
    session: &Session,
    clock: &C,
    options: PollOptions,
    target: PowerState,
) -> E2eResult<PowerState> {
    let what = format!("PowerState == {}", target);
    let state = poll_until(
        clock,
        options,
        &what,
        || get_system(session).map(|system| system.power_state),
        |state| *state == target,
    )?;
    info!("System reached power state {}", state);
    Ok(state)
}
