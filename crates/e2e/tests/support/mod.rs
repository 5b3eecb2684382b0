//! In-process mock of the Redfish endpoints the harness talks to

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing_subscriber::fmt::MakeWriter;

use bmc_e2e::{BmcConfig, Credentials};

const SESSIONS: &str = "/redfish/v1/SessionService/Sessions";

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub username: String,
    pub password: String,
    /// Status answered by ComputerSystem.Reset
    pub reset_status: u16,
    /// System GETs after a reset before PowerState turns On; `None` never
    pub power_on_after_polls: Option<usize>,
    /// Failed logins that lock the account
    pub lockout_threshold: Option<usize>,
    pub omit_location: bool,
    pub omit_power_state: bool,
    /// Answer session DELETEs with this status and keep the session
    pub delete_status: Option<u16>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            username: "root".into(),
            password: "0penBmc".into(),
            reset_status: 204,
            power_on_after_polls: Some(3),
            lockout_threshold: None,
            omit_location: false,
            omit_power_state: false,
            delete_status: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub options: MockOptions,
    /// Live sessions, id -> token
    pub sessions: HashMap<String, String>,
    pub created: usize,
    pub deletes: Vec<String>,
    pub failed_logins: usize,
    pub locked: bool,
    pub power_on: bool,
    pending_polls: Option<usize>,
    reset_requested: bool,
    pub system_gets: usize,
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockBmc {
    pub base_url: String,
    pub state: Shared,
}

impl MockBmc {
    pub fn start(options: MockOptions) -> Self {
        let state = Arc::new(Mutex::new(MockState {
            options,
            ..Default::default()
        }));
        let app = router(state.clone());

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("build mock runtime");
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind mock listener");
                tx.send(listener.local_addr().expect("mock addr"))
                    .expect("report mock addr");
                axum::serve(listener, app).await.expect("serve mock");
            });
        });

        let addr = rx.recv().expect("mock server started");
        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Harness config pointing at this mock
    pub fn config(&self) -> BmcConfig {
        let state = self.state.lock();
        let options = &state.options;
        BmcConfig {
            base_url: self.base_url.clone(),
            credentials: Credentials::new(options.username.clone(), options.password.clone()),
            request_timeout_secs: 5,
            ..Default::default()
        }
        .validate()
        .expect("valid mock config")
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn created_sessions(&self) -> usize {
        self.state.lock().created
    }

    pub fn deletes_of(&self, location: &str) -> usize {
        let id = location.rsplit('/').next().unwrap_or_default();
        self.state.lock().deletes.iter().filter(|d| d.as_str() == id).count()
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route(SESSIONS, post(create_session))
        .route(
            "/redfish/v1/SessionService/Sessions/:id",
            get(get_session).delete(delete_session),
        )
        .route("/redfish/v1/Systems/system", get(get_system))
        .route(
            "/redfish/v1/Systems/system/Actions/ComputerSystem.Reset",
            post(reset_system),
        )
        .with_state(state)
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    headers
        .get("X-Auth-Token")
        .and_then(|v| v.to_str().ok())
        .map(|token| state.sessions.values().any(|t| t == token))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response()
}

async fn create_session(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock();
    let user = body.get("UserName").and_then(Value::as_str).unwrap_or_default();
    let pass = body.get("Password").and_then(Value::as_str).unwrap_or_default();

    if state.locked {
        return unauthorized();
    }
    if user != state.options.username || pass != state.options.password {
        state.failed_logins += 1;
        if let Some(threshold) = state.options.lockout_threshold {
            if state.failed_logins >= threshold {
                state.locked = true;
            }
        }
        return unauthorized();
    }

    state.failed_logins = 0;
    state.created += 1;
    let id = format!("s{}", state.created);
    let token = format!("token-{}", state.created);
    state.sessions.insert(id.clone(), token.clone());

    let mut resp = (StatusCode::CREATED, Json(json!({"Id": id, "UserName": user}))).into_response();
    let headers = resp.headers_mut();
    headers.insert("X-Auth-Token", HeaderValue::from_str(&token).expect("token header"));
    if !state.options.omit_location {
        headers.insert(
            "Location",
            HeaderValue::from_str(&format!("{}/{}", SESSIONS, id)).expect("location header"),
        );
    }
    resp
}

async fn get_session(State(state): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let state = state.lock();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if !state.sessions.contains_key(&id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({"Id": id})).into_response()
}

async fn delete_session(State(state): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut state = state.lock();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.deletes.push(id.clone());
    if let Some(code) = state.options.delete_status {
        return StatusCode::from_u16(code).expect("delete status").into_response();
    }
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_system(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.system_gets += 1;
    if state.reset_requested {
        let pending = state.pending_polls;
        match pending {
            Some(n) if n <= 1 => {
                state.power_on = true;
                state.reset_requested = false;
                state.pending_polls = None;
            }
            Some(n) => state.pending_polls = Some(n - 1),
            None => {}
        }
    }

    let mut body = json!({
        "@odata.id": "/redfish/v1/Systems/system",
        "Id": "system",
        "Status": {"State": "Enabled", "Health": "OK"},
        "PowerState": if state.power_on { "On" } else { "Off" },
    });
    if state.options.omit_power_state {
        if let Some(map) = body.as_object_mut() {
            map.remove("PowerState");
        }
    }
    Json(body).into_response()
}

async fn reset_system(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut state = state.lock();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if body.get("ResetType").and_then(Value::as_str) == Some("On") {
        let after = state.options.power_on_after_polls;
        match after {
            Some(0) => state.power_on = true,
            Some(n) => {
                state.reset_requested = true;
                state.pending_polls = Some(n);
            }
            None => {
                state.reset_requested = true;
                state.pending_polls = None;
            }
        }
    }
    let status = StatusCode::from_u16(state.options.reset_status).expect("reset status");
    if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(json!({"@Message.ExtendedInfo": []}))).into_response()
    }
}

/// Subscriber writer that keeps log lines in memory
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a thread-local subscriber capturing everything it logs
pub fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}
