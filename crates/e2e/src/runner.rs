//! Scenario runner: one fresh session per scenario, results to JSON

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{BmcConfig, Credentials};
use crate::error::{E2eError, E2eResult};
use crate::redfish::{
    build_client, get_system, reset_system, wait_for_power_state, PowerState, ResetType,
    SystemResource, SYSTEM_PATH,
};
use crate::session::{login, Session};

/// Username that must never authenticate
const INVALID_USERNAME: &str = "invalid-user";

/// The scenarios the suite knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Login answers 201 with a usable token
    CorrectSessions,
    /// The system resource carries `Status` and `PowerState`
    SystemsWithSession,
    /// Reset "On" is accepted and the system reaches `PowerState` On
    PowerManagement,
    /// Unknown credentials are refused without creating a session
    InvalidCredentials,
    /// Repeated bad logins, then a correct one; reports what the server did
    AccountLockout,
}

impl Scenario {
    /// Every scenario in run order. Lockout goes last since it may lock the account.
    pub const ALL: [Scenario; 5] = [
        Scenario::CorrectSessions,
        Scenario::SystemsWithSession,
        Scenario::PowerManagement,
        Scenario::InvalidCredentials,
        Scenario::AccountLockout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::CorrectSessions => "correct_sessions",
            Scenario::SystemsWithSession => "systems_with_session",
            Scenario::PowerManagement => "power_management",
            Scenario::InvalidCredentials => "invalid_credentials",
            Scenario::AccountLockout => "account_lockout",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| E2eError::InvalidConfig(format!("Unknown scenario: {}", s)))
    }
}

/// What the server did when the right password followed repeated bad ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LockoutOutcome {
    /// The correct login was refused with this status
    Enforced { status: u16 },
    /// The correct login still succeeded
    NotEnforced,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockout: Option<LockoutOutcome>,
}

/// Result of running a list of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Default)]
struct ScenarioReport {
    notes: Vec<String>,
    lockout: Option<LockoutOutcome>,
}

impl ScenarioReport {
    fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        info!("{}", note);
        self.notes.push(note);
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> E2eResult<()> {
    if condition {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(message()))
    }
}

/// Runs scenarios against one BMC
pub struct TestRunner<C: Clock = SystemClock> {
    config: BmcConfig,
    client: Client,
    clock: C,
    output_dir: PathBuf,
}

impl TestRunner<SystemClock> {
    pub fn new(config: BmcConfig) -> E2eResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TestRunner<C> {
    /// Create a runner that sleeps through `clock` while polling
    pub fn with_clock(config: BmcConfig, clock: C) -> E2eResult<Self> {
        let client = build_client(config.verify_tls, config.request_timeout())?;
        Ok(Self {
            config,
            client,
            clock,
            output_dir: PathBuf::from("test-results"),
        })
    }

    /// Directory that receives `test-results.json`
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn config(&self) -> &BmcConfig {
        &self.config
    }

    pub fn run_all(&self) -> TestSuiteResult {
        self.run_scenarios(&Scenario::ALL)
    }

    /// Run scenarios in order; a failure never stops the ones after it
    pub fn run_scenarios(&self, scenarios: &[Scenario]) -> TestSuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Running {} test(s) against {}", scenarios.len(), self.config.base_url);

        let results: Vec<TestResult> = scenarios.iter().map(|s| self.run_scenario(*s)).collect();
        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        TestSuiteResult {
            started_at,
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run one scenario. Errors become a failed result and an error log line.
    pub fn run_scenario(&self, scenario: Scenario) -> TestResult {
        let start = Instant::now();
        info!("Starting test: {}", scenario);

        let outcome = match scenario {
            Scenario::CorrectSessions => self.correct_sessions(),
            Scenario::SystemsWithSession => self.systems_with_session(),
            Scenario::PowerManagement => self.power_management(),
            Scenario::InvalidCredentials => self.invalid_credentials(),
            Scenario::AccountLockout => self.account_lockout(),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(report) => {
                info!("✓ {} ({} ms)", scenario, duration_ms);
                TestResult {
                    name: scenario.name().to_string(),
                    success: true,
                    duration_ms,
                    error: None,
                    notes: report.notes,
                    lockout: report.lockout,
                }
            }
            Err(e) => {
                error!("test {} failed: {}", scenario, e);
                TestResult {
                    name: scenario.name().to_string(),
                    success: false,
                    duration_ms,
                    error: Some(e.to_string()),
                    notes: Vec::new(),
                    lockout: None,
                }
            }
        }
    }

    /// Write results as `test-results.json` in the output directory
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        write_results(&self.output_dir, results)
    }

    fn open_session(&self) -> E2eResult<Session> {
        Session::acquire_with(self.client.clone(), &self.config.base_url, &self.config.credentials)
    }

    fn correct_sessions(&self) -> E2eResult<ScenarioReport> {
        let mut report = ScenarioReport::default();

        let resp = login(&self.client, &self.config.base_url, &self.config.credentials)?;
        let status = resp.status;
        let session = Session::from_login(self.client.clone(), &self.config.base_url, resp)?;

        ensure(status == StatusCode::CREATED, || {
            format!("expected 201 Created, got {}", status)
        })?;
        ensure(!session.auth_token().is_empty(), || {
            "X-Auth-Token header is empty".to_string()
        })?;

        // The token must authorize a follow-up request
        session.get_resource(session.location())?;
        report.note(format!("Session {} authenticated", session.location()));
        Ok(report)
    }

    fn systems_with_session(&self) -> E2eResult<ScenarioReport> {
        let mut report = ScenarioReport::default();
        let session = self.open_session()?;

        let document = session.get_resource(SYSTEM_PATH)?;
        ensure(document.get("Status").is_some(), || {
            "response is missing the Status field".to_string()
        })?;
        ensure(document.get("PowerState").is_some(), || {
            "response is missing the PowerState field".to_string()
        })?;

        let system: SystemResource = serde_json::from_value(document)?;
        report.note(format!(
            "System PowerState={} Health={}",
            system.power_state,
            system.status.health.as_deref().unwrap_or("unknown")
        ));
        Ok(report)
    }

    fn power_management(&self) -> E2eResult<ScenarioReport> {
        let mut report = ScenarioReport::default();
        let session = self.open_session()?;
        let accepted = self.config.reset_accepted_statuses()?;

        let before = get_system(&session)?.power_state;
        report.note(format!("Initial PowerState: {}", before));

        let response = reset_system(&session, ResetType::On)?;
        accepted.check(&response)?;
        if response.status != StatusCode::ACCEPTED {
            warn!(
                "Reset returned {} rather than 202 Accepted; allowed by accepted set [{}]",
                response.status, accepted
            );
            report.notes.push(format!(
                "Reset returned {} instead of 202 Accepted",
                response.status.as_u16()
            ));
        }

        wait_for_power_state(
            &session,
            &self.clock,
            self.config.power_poll_options(),
            PowerState::On,
        )?;
        report.note("System powered on".to_string());
        Ok(report)
    }

    fn invalid_credentials(&self) -> E2eResult<ScenarioReport> {
        let mut report = ScenarioReport::default();
        let credentials = Credentials::new(INVALID_USERNAME, INVALID_USERNAME);

        match Session::acquire_with(self.client.clone(), &self.config.base_url, &credentials) {
            Ok(session) => {
                drop(session);
                Err(E2eError::AssertionFailed(
                    "login with unknown credentials was accepted".to_string(),
                ))
            }
            Err(e) if e.is_authentication() => {
                report.note(format!("Unknown credentials rejected: {}", e));
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }

    fn account_lockout(&self) -> E2eResult<ScenarioReport> {
        let mut report = ScenarioReport::default();
        let credentials = self.config.lockout_credentials();
        let wrong = Credentials::new(
            credentials.username.clone(),
            format!("{}-wrong", credentials.password),
        );
        let attempts = self.config.lockout_attempts;

        for attempt in 1..=attempts {
            let resp = login(&self.client, &self.config.base_url, &wrong)?;
            if resp.status == StatusCode::CREATED {
                let status = resp.status;
                // Still release whatever the server created
                if let Ok(session) = Session::from_login(self.client.clone(), &self.config.base_url, resp) {
                    session.close();
                }
                return Err(E2eError::AssertionFailed(format!(
                    "wrong password accepted on attempt {} ({})",
                    attempt, status
                )));
            }
            info!("Failed login {}/{} returned {}", attempt, attempts, resp.status);
        }

        let resp = login(&self.client, &self.config.base_url, credentials)?;
        let outcome = if resp.status == StatusCode::CREATED {
            Session::from_login(self.client.clone(), &self.config.base_url, resp)?.close();
            warn!(
                "No lockout: correct login succeeded after {} failed attempts",
                attempts
            );
            LockoutOutcome::NotEnforced
        } else {
            warn!(
                "Lockout enforced: correct login refused with {} after {} failed attempts",
                resp.status, attempts
            );
            LockoutOutcome::Enforced {
                status: resp.status.as_u16(),
            }
        };
        report.notes.push(format!("Lockout outcome: {:?}", outcome));

        if let Some(expected) = self.config.expect_lockout {
            let enforced = matches!(outcome, LockoutOutcome::Enforced { .. });
            ensure(enforced == expected, || {
                format!(
                    "expected lockout enforced={}, server behaviour was {:?}",
                    expected, outcome
                )
            })?;
        }

        report.lockout = Some(outcome);
        Ok(report)
    }
}

/// Write test results to `<dir>/test-results.json`
pub fn write_results(dir: &Path, results: &TestSuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}
