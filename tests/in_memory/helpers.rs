//! Shared harness for in-memory manager tests.

use crate::test_helpers::{ManualClock, epoch, group_record, proxy_record};
use chrono::TimeDelta;
use eyre::WrapErr;
use mockable::Clock;
use proxy_groups::ipc::{UpdateNotifier, channel};
use proxy_groups::proxy_group::{
    adapters::{
        activity::ActivityMonitor, macros::UserMacroTable, memory::InMemoryProxyGroupStore,
    },
    domain::{HostId, ProxyGroupId, ProxyId},
    services::{
        CycleReport, ManagerError, ManagerPorts, ManagerSettings, ProxyGroupManager,
        ShutdownSignal,
    },
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Manager wired to in-memory adapters and a manual clock.
pub type TestManager = ProxyGroupManager<
    InMemoryProxyGroupStore,
    InMemoryProxyGroupStore,
    UserMacroTable,
    ActivityMonitor,
    ManualClock,
>;

/// Group every seeded proxy and host belongs to.
pub const GROUP: ProxyGroupId = ProxyGroupId::new(1);

/// Clock advance between two manager ticks; matches the default check interval.
pub const STEP: TimeDelta = TimeDelta::seconds(5);

/// Creates a store holding group 1 with a 60 second failover delay, the
/// given proxies in it, and the given hosts configured into it.
pub fn seeded_store(
    min_online: &str,
    proxies: &[u64],
    hosts: impl IntoIterator<Item = u64>,
) -> eyre::Result<InMemoryProxyGroupStore> {
    let store = InMemoryProxyGroupStore::new();
    store.upsert_group(group_record(GROUP.value(), "60", min_online))?;
    for proxy_id in proxies {
        store.upsert_proxy(proxy_record(*proxy_id, Some(GROUP.value())))?;
    }
    for host_id in hosts {
        store.set_host_group(HostId::new(host_id), Some(GROUP))?;
    }
    Ok(store)
}

/// A started manager together with the handles tests drive it through.
pub struct Harness {
    pub store: InMemoryProxyGroupStore,
    pub clock: Arc<ManualClock>,
    pub notifier: UpdateNotifier,
    pub manager: TestManager,
}

impl Harness {
    /// Starts a manager over `store` at [`epoch`].
    pub fn start(store: InMemoryProxyGroupStore) -> Result<Self, ManagerError> {
        Self::start_with_macros(store, UserMacroTable::default())
    }

    /// Starts a manager over `store` expanding group settings with `macros`.
    pub fn start_with_macros(
        store: InMemoryProxyGroupStore,
        macros: UserMacroTable,
    ) -> Result<Self, ManagerError> {
        let clock = Arc::new(ManualClock::new(epoch()));
        let (notifier, endpoint) = channel();
        let ports = ManagerPorts {
            store: Arc::new(store.clone()),
            topology: Arc::new(store.clone()),
            macros: Arc::new(macros),
            activity: Arc::new(ActivityMonitor::new()),
        };
        let settings = ManagerSettings {
            flush_retry: Duration::ZERO,
            ..ManagerSettings::default()
        };
        let manager = ProxyGroupManager::start(
            ports,
            Arc::clone(&clock),
            settings,
            ShutdownSignal::new(),
            endpoint,
        )?;
        Ok(Self {
            store,
            clock,
            notifier,
            manager,
        })
    }

    /// Records contact from `proxies` at the current time.
    pub fn report(&self, proxies: &[u64]) -> eyre::Result<()> {
        let now = self.clock.utc();
        for proxy_id in proxies {
            self.store
                .set_last_access(ProxyId::new(*proxy_id), Some(now))
                .wrap_err("record proxy contact")?;
        }
        Ok(())
    }

    /// Runs `steps` ticks, advancing the clock by [`STEP`] before each and
    /// recording contact from `reporting` just before the tick.
    pub fn run(&mut self, steps: usize, reporting: &[u64]) -> eyre::Result<Vec<CycleReport>> {
        let mut reports = Vec::with_capacity(steps);
        for _ in 0..steps {
            self.clock.advance(STEP);
            self.report(reporting)?;
            reports.extend(self.manager.tick());
        }
        Ok(reports)
    }

    /// Counts stored mappings served by `proxy_id`.
    pub fn stored_hosts_of(&self, proxy_id: u64) -> eyre::Result<usize> {
        let mappings = self.store.mappings()?;
        Ok(mappings
            .iter()
            .filter(|mapping| mapping.proxy_id == ProxyId::new(proxy_id))
            .count())
    }

    /// Stops the update service and clears the cache.
    pub fn shutdown(self) -> eyre::Result<()> {
        self.manager.shutdown().wrap_err("shut down manager")
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
