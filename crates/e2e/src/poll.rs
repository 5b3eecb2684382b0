//! Bounded polling against an injectable clock

use std::fmt::Debug;
use std::time::Duration;

use tracing::{debug, error};

use crate::clock::Clock;
use crate::error::{E2eError, E2eResult};

/// Shortest sleep between attempts; a zero interval would spin.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Deadline and cadence for a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Fetch repeatedly until `predicate` holds or the timeout elapses.
///
/// Returns the first fetched value satisfying the predicate. Errors from
/// `fetch` abort the loop immediately; only an unsatisfied predicate is
/// retried. Sleeps are clipped to the remaining budget, so the loop never
/// overshoots `timeout` by more than the time spent inside `fetch`.
///
/// On timeout the error carries the last observed value in `Debug` form.
pub fn poll_until<C, T, F, P>(
    clock: &C,
    options: PollOptions,
    what: &str,
    mut fetch: F,
    predicate: P,
) -> E2eResult<T>
where
    C: Clock + ?Sized,
    T: Debug,
    F: FnMut() -> E2eResult<T>,
    P: Fn(&T) -> bool,
{
    let interval = options.interval.max(MIN_INTERVAL);
    let start = clock.now();
    let mut attempts = 0;

    loop {
        let value = fetch()?;
        attempts += 1;

        if predicate(&value) {
            debug!(attempts, "Condition met: {}", what);
            return Ok(value);
        }

        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= options.timeout {
            let last_observed = format!("{:?}", value);
            error!(
                attempts,
                "Timed out after {:?} waiting for {} (last observed: {})",
                elapsed, what, last_observed
            );
            return Err(E2eError::Timeout {
                what: what.to_string(),
                elapsed,
                attempts,
                last_observed,
            });
        }

        debug!(attempts, "Waiting for {}, last observed: {:?}", what, value);
        clock.sleep(interval.min(options.timeout - elapsed));
    }
}
