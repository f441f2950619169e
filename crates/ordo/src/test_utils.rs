//! Shared test helpers.

use std::time::{Duration, Instant};

/// Polls until `condition` becomes true or timeout elapses.
///
/// Backoff grows exponentially and is capped at `max_backoff`.
pub fn poll_until_with_backoff<F>(
    timeout: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut backoff = initial_backoff.max(Duration::from_millis(1));
    let max_backoff = max_backoff.max(backoff);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(backoff);
        backoff = backoff.saturating_mul(2).min(max_backoff);
    }
    condition()
}

/// Polls with the default backoff used by lane and coordinator tests.
pub fn poll_until<F>(timeout: Duration, condition: F) -> bool
where
    F: FnMut() -> bool,
{
    poll_until_with_backoff(
        timeout,
        Duration::from_millis(2),
        Duration::from_millis(50),
        condition,
    )
}

/// Counter command for unit tests: adds to an `i64` payload.
#[cfg(test)]
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) enum Tally {
    Add(i64),
    Fail,
}

#[cfg(test)]
impl crate::command::Command for Tally {
    type Context = i64;

    fn execute(
        &self,
        env: &mut crate::command::Environment<'_, i64>,
    ) -> Result<(), crate::command::CommandError> {
        match self {
            Tally::Add(n) => {
                *env.payload_mut() += n;
                Ok(())
            }
            Tally::Fail => Err(crate::command::CommandError::failed("tally refused")),
        }
    }
}
