//! Shared world state for proxy group failover scenarios.

use crate::test_helpers::{ManualClock, epoch};
use chrono::TimeDelta;
use eyre::WrapErr;
use mockable::Clock;
use proxy_groups::ipc::{UpdateNotifier, channel};
use proxy_groups::proxy_group::{
    adapters::{
        activity::ActivityMonitor, macros::UserMacroTable, memory::InMemoryProxyGroupStore,
    },
    domain::{ProxyGroupId, ProxyId},
    services::{ManagerPorts, ManagerSettings, ProxyGroupManager, ShutdownSignal},
};
use rstest::fixture;
use std::sync::Arc;
use std::time::Duration;

/// Manager type driven by the scenarios.
pub type FailoverManager = ProxyGroupManager<
    InMemoryProxyGroupStore,
    InMemoryProxyGroupStore,
    UserMacroTable,
    ActivityMonitor,
    ManualClock,
>;

/// Group every scenario configures.
pub const GROUP: ProxyGroupId = ProxyGroupId::new(1);

const STEP_SECS: usize = 5;

/// Scenario world: a store, a manual clock and, once started, a manager.
pub struct FailoverWorld {
    pub store: InMemoryProxyGroupStore,
    pub clock: Arc<ManualClock>,
    pub manager: Option<FailoverManager>,
    notifier: Option<UpdateNotifier>,
}

impl FailoverWorld {
    /// Creates a world with an empty store at the start of the timeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: InMemoryProxyGroupStore::new(),
            clock: Arc::new(ManualClock::new(epoch())),
            manager: None,
            notifier: None,
        }
    }

    /// Starts the manager and runs its first cycle.
    pub fn start(&mut self) -> eyre::Result<()> {
        let (notifier, endpoint) = channel();
        let ports = ManagerPorts {
            store: Arc::new(self.store.clone()),
            topology: Arc::new(self.store.clone()),
            macros: Arc::new(UserMacroTable::default()),
            activity: Arc::new(ActivityMonitor::new()),
        };
        let settings = ManagerSettings {
            flush_retry: Duration::ZERO,
            ..ManagerSettings::default()
        };
        let mut manager = ProxyGroupManager::start(
            ports,
            Arc::clone(&self.clock),
            settings,
            ShutdownSignal::new(),
            endpoint,
        )
        .wrap_err("start proxy group manager")?;
        manager.tick();
        self.manager = Some(manager);
        self.notifier = Some(notifier);
        Ok(())
    }

    /// Returns the running manager.
    pub fn manager(&self) -> eyre::Result<&FailoverManager> {
        self.manager
            .as_ref()
            .ok_or_else(|| eyre::eyre!("manager has not been started"))
    }

    /// Lets `seconds` pass in check-interval steps; `reporting` proxies
    /// contact the server right before every cycle.
    pub fn pass(&mut self, seconds: usize, reporting: &[ProxyId]) -> eyre::Result<()> {
        for _ in (0..seconds).step_by(STEP_SECS) {
            self.clock.advance(TimeDelta::seconds(5));
            let now = self.clock.utc();
            for proxy_id in reporting {
                self.store.set_last_access(*proxy_id, Some(now))?;
            }
            self.manager
                .as_mut()
                .ok_or_else(|| eyre::eyre!("manager has not been started"))?
                .tick();
        }
        Ok(())
    }
}

impl Default for FailoverWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FailoverWorld {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.take() {
            drop(manager.shutdown());
        }
    }
}

/// Parses identifier lists such as `1, 2 and 3`.
#[must_use]
pub fn parse_ids(text: &str) -> Vec<u64> {
    text.split(|character: char| !character.is_ascii_digit())
        .filter_map(|digits| digits.parse().ok())
        .collect()
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> FailoverWorld {
    FailoverWorld::default()
}
