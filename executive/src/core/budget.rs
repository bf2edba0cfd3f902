//! Shared time budget helpers for deadline-bounded waits.

use std::time::{Duration, Instant};

/// Return the remaining time budget until `deadline`, or `None` once it has passed.
pub fn remaining_budget(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|remaining| !remaining.is_zero())
}

/// Length of the next wait in a polling loop: the remaining budget, capped at `poll`.
pub fn wait_slice(deadline: Instant, poll: Duration) -> Option<Duration> {
    remaining_budget(deadline).map(|remaining| remaining.min(poll))
}
