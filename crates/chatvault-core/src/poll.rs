//! Poll-with-bounded-retry primitive.
//!
//! Health-endpoint waits, datastore-readiness waits, and shutdown waits
//! all share this loop: run an async predicate up to `max_attempts`
//! times with a fixed sleep between attempts.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Bounds for one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSpec {
    /// Maximum number of predicate evaluations.
    pub max_attempts: u32,
    /// Sleep between attempts.
    pub interval: Duration,
}

impl PollSpec {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Result of a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate returned true on attempt N (1-based).
    Satisfied { attempts: u32 },
    /// All attempts were used without the predicate returning true.
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }
}

/// Run `predicate` until it returns true or `spec.max_attempts` is used up.
///
/// Sleeps `spec.interval` between attempts, but not after the final one.
pub async fn poll_until<F, Fut>(what: &str, spec: PollSpec, mut predicate: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=spec.max_attempts {
        if predicate().await {
            debug!(what, attempt, "poll satisfied");
            return PollOutcome::Satisfied { attempts: attempt };
        }
        if attempt < spec.max_attempts {
            tokio::time::sleep(spec.interval).await;
        }
    }
    debug!(what, attempts = spec.max_attempts, "poll exhausted");
    PollOutcome::Exhausted {
        attempts: spec.max_attempts,
    }
}
