//! Port for reporting manager activity to process self-monitoring.

use std::fmt;

/// Whether the reporting thread is working or waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityState {
    /// Processing a loop phase.
    Busy,
    /// Sleeping or waiting for messages.
    Idle,
}

impl ActivityState {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Receives the process title and busy/idle transitions of a loop.
pub trait ActivityReporter: Send + Sync {
    /// Replaces the descriptive title of the current phase.
    fn set_title(&self, title: &str);

    /// Records a busy or idle transition.
    fn set_state(&self, state: ActivityState);
}
