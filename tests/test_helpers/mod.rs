//! Shared helpers for integration tests: a manually driven clock, topology
//! record builders, and scoped environment guards.

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use proxy_groups::proxy_group::domain::{GroupRecord, ProxyGroupId, ProxyId, ProxyRecord};
use std::env;
use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Start of every simulated timeline.
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    fn current(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.current();
        *now += delta;
    }

    /// Returns the seconds elapsed since [`epoch`].
    #[must_use]
    pub fn elapsed_secs(&self) -> i64 {
        (*self.current() - epoch()).num_seconds()
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.current().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.current()
    }
}

/// Builds a group definition.
#[must_use]
pub fn group_record(id: u64, failover_delay: &str, min_online: &str) -> GroupRecord {
    GroupRecord {
        id: ProxyGroupId::new(id),
        name: format!("group-{id}"),
        failover_delay: failover_delay.to_owned(),
        min_online: min_online.to_owned(),
    }
}

/// Builds a proxy definition that never contacted the server.
#[must_use]
pub fn proxy_record(id: u64, group: Option<u64>) -> ProxyRecord {
    ProxyRecord {
        id: ProxyId::new(id),
        name: format!("proxy-{id}"),
        group: group.map(ProxyGroupId::new),
        last_access: None,
    }
}

/// Guard that applies a scoped environment variable update.
///
/// Updates are serialised through a process-wide mutex held for the guard
/// lifetime.
pub struct EnvVarGuard {
    previous: Vec<(OsString, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    /// Applies every change, remembering the previous values.
    pub fn set_many(changes: &[(OsString, Option<OsString>)]) -> Self {
        let lock = ENV_MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = changes
            .iter()
            .map(|(key, value)| {
                let old = env::var_os(key);
                apply(key, value.as_ref());
                (key.clone(), old)
            })
            .collect();

        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..) {
            apply(&key, value.as_ref());
        }
    }
}

fn apply(key: &OsString, value: Option<&OsString>) {
    unsafe {
        // SAFETY: ENV_MUTEX serialises environment mutations in tests.
        match value {
            Some(new_value) => env::set_var(key, new_value),
            None => env::remove_var(key),
        }
    }
}
