//! Activity reporter that logs phase titles and accumulates busy/idle time.

use crate::proxy_group::ports::{ActivityReporter, ActivityState};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Accumulated self-monitoring counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityStats {
    /// Most recently reported title.
    pub title: String,
    /// Current state.
    pub state: ActivityState,
    /// Total time spent busy, excluding the current interval.
    pub busy: Duration,
    /// Total time spent idle, excluding the current interval.
    pub idle: Duration,
}

#[derive(Debug)]
struct Counters {
    stats: ActivityStats,
    since: Instant,
}

/// Thread-safe [`ActivityReporter`] used by the bundled binary.
#[derive(Debug)]
pub struct ActivityMonitor {
    counters: Mutex<Counters>,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor {
    /// Creates a monitor in the busy state with empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters {
                stats: ActivityStats {
                    title: String::new(),
                    state: ActivityState::Busy,
                    busy: Duration::ZERO,
                    idle: Duration::ZERO,
                },
                since: Instant::now(),
            }),
        }
    }

    /// Returns a copy of the accumulated counters.
    #[must_use]
    pub fn stats(&self) -> ActivityStats {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .clone()
    }
}

impl ActivityReporter for ActivityMonitor {
    fn set_title(&self, title: &str) {
        trace!(title, "activity title changed");
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        title.clone_into(&mut counters.stats.title);
    }

    fn set_state(&self, state: ActivityState) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        if counters.stats.state == state {
            return;
        }
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(counters.since);
        match counters.stats.state {
            ActivityState::Busy => counters.stats.busy += elapsed,
            ActivityState::Idle => counters.stats.idle += elapsed,
        }
        counters.stats.state = state;
        counters.since = now;
    }
}
