//! BMC Redfish E2E Test Harness
//!
//! This crate drives a Baseboard Management Controller through its Redfish
//! API and checks the session and power-control contract:
//! - Opens token sessions and always deletes them again
//! - Reads protected resources with the session token
//! - Invokes power actions and polls until the system reaches a state
//! - Runs named scenarios and writes a JSON result file
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  E2E Test Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── run_scenario(Scenario) -> TestResult                 │
//! │    └── write_results(TestSuiteResult)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session (deleted on release or drop)                       │
//! │    ├── acquire  POST   /redfish/v1/SessionService/Sessions  │
//! │    ├── get_resource / invoke_action   (X-Auth-Token)        │
//! │    └── release  DELETE <Location>                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  poll_until(clock, timeout, interval, fetch, predicate)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod poll;
pub mod redfish;
pub mod runner;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BmcConfig, Credentials};
pub use error::{E2eError, E2eResult};
pub use poll::{poll_until, PollOptions};
pub use redfish::{AcceptedStatuses, PowerState, ResetType, SystemResource};
pub use runner::{LockoutOutcome, Scenario, TestRunner};
pub use session::{acquire_session, release_session, Session};
