//! The shared proxy group cache.
//!
//! [`ProxyGroupCache`] is the only structure touched by both the manager
//! loop and the update service. All state lives in [`CacheState`] behind a
//! single mutex; callers take the lock with [`ProxyGroupCache::lock`] for
//! the duration of one pass and must not perform I/O while holding it.
//!
//! The cache never reports errors. Events referring to objects it does not
//! know are logged and ignored.

mod balance;
mod drain;
mod health;
mod membership;
mod reconcile;
mod snapshot;

pub use health::{EvaluationReport, ResolvedSettings};
pub use snapshot::CacheSnapshot;

use crate::proxy_group::domain::{
    HostId, HostProxyMapping, MapRevision, Proxy, ProxyGroup, ProxyGroupId, ProxyId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// Mutex-protected registry of groups, proxies and host mappings.
#[derive(Debug)]
pub struct ProxyGroupCache {
    state: Mutex<CacheState>,
}

impl ProxyGroupCache {
    /// Creates an empty cache seeded with the durable mapping watermark.
    #[must_use]
    pub fn new(hostmap_revision: MapRevision, startup_time: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(CacheState::new(hostmap_revision, startup_time)),
        }
    }

    /// Locks the cache for one pass.
    ///
    /// A poisoned lock is recovered; the next evaluation pass repairs any
    /// half-applied queue state.
    pub fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Logs a JSON snapshot of the cache when trace logging is enabled.
    pub fn dump(&self) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        let snapshot = self.lock().snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => trace!(cache = %json, "proxy group cache dump"),
            Err(err) => warn!(error = %err, "cannot serialise proxy group cache snapshot"),
        }
    }

    /// Drops all cached state, keeping only the revision watermark.
    pub fn clear(&self) {
        let mut state = self.lock();
        let revision = state.hostmap_revision;
        let startup_time = state.startup_time;
        *state = CacheState::new(revision, startup_time);
    }
}

/// State guarded by the [`ProxyGroupCache`] lock.
#[derive(Debug)]
pub struct CacheState {
    groups: HashMap<ProxyGroupId, ProxyGroup>,
    proxies: HashMap<ProxyId, Proxy>,
    host_groups: HashMap<HostId, ProxyGroupId>,
    hostmap: HashMap<HostId, HostProxyMapping>,
    hostmap_updates: BTreeMap<HostId, Option<ProxyId>>,
    group_updates: Vec<ProxyGroupId>,
    proxy_updates: Vec<ProxyId>,
    hostmap_revision: MapRevision,
    startup_time: DateTime<Utc>,
}

impl CacheState {
    fn new(hostmap_revision: MapRevision, startup_time: DateTime<Utc>) -> Self {
        Self {
            groups: HashMap::new(),
            proxies: HashMap::new(),
            host_groups: HashMap::new(),
            hostmap: HashMap::new(),
            hostmap_updates: BTreeMap::new(),
            group_updates: Vec::new(),
            proxy_updates: Vec::new(),
            hostmap_revision,
            startup_time,
        }
    }

    /// Returns the group with the given identifier.
    #[must_use]
    pub fn group(&self, group_id: ProxyGroupId) -> Option<&ProxyGroup> {
        self.groups.get(&group_id)
    }

    /// Iterates over all cached groups.
    pub fn groups(&self) -> impl Iterator<Item = &ProxyGroup> {
        self.groups.values()
    }

    /// Returns the proxy with the given identifier.
    #[must_use]
    pub fn proxy(&self, proxy_id: ProxyId) -> Option<&Proxy> {
        self.proxies.get(&proxy_id)
    }

    /// Iterates over all cached proxies.
    pub fn proxies(&self) -> impl Iterator<Item = &Proxy> {
        self.proxies.values()
    }

    /// Returns the installed mapping of a host.
    #[must_use]
    pub fn mapping(&self, host_id: HostId) -> Option<&HostProxyMapping> {
        self.hostmap.get(&host_id)
    }

    /// Iterates over installed mappings.
    pub fn mappings(&self) -> impl Iterator<Item = &HostProxyMapping> {
        self.hostmap.values()
    }

    /// Returns the pending, not yet drained, proxy change of a host.
    ///
    /// The outer `Option` tells whether a change is pending; the inner one
    /// is `None` for an unassignment.
    #[must_use]
    pub fn pending_assignment(&self, host_id: HostId) -> Option<Option<ProxyId>> {
        self.hostmap_updates.get(&host_id).copied()
    }

    /// Returns the proxy a host will be served by once pending changes land.
    #[must_use]
    pub fn effective_proxy(&self, host_id: HostId) -> Option<ProxyId> {
        match self.hostmap_updates.get(&host_id) {
            Some(pending) => *pending,
            None => self.hostmap.get(&host_id).map(|mapping| mapping.proxy_id),
        }
    }

    /// Returns the group a host is configured into.
    #[must_use]
    pub fn host_group(&self, host_id: HostId) -> Option<ProxyGroupId> {
        self.host_groups.get(&host_id).copied()
    }

    /// Returns the groups queued for re-evaluation and flushing.
    #[must_use]
    pub fn queued_groups(&self) -> &[ProxyGroupId] {
        &self.group_updates
    }

    /// Returns the proxies queued for flushing.
    #[must_use]
    pub fn queued_proxies(&self) -> &[ProxyId] {
        &self.proxy_updates
    }

    /// Returns whether a drain would find anything to persist.
    ///
    /// Destroyed groups leave their mapping deletions behind without a
    /// queued group, so host-map changes count on their own.
    #[must_use]
    pub fn has_pending_updates(&self) -> bool {
        !(self.group_updates.is_empty()
            && self.proxy_updates.is_empty()
            && self.hostmap_updates.is_empty())
    }

    /// Returns the latest mapping revision handed out by a drain.
    #[must_use]
    pub const fn hostmap_revision(&self) -> MapRevision {
        self.hostmap_revision
    }

    /// Returns when the manager started.
    #[must_use]
    pub const fn startup_time(&self) -> DateTime<Utc> {
        self.startup_time
    }

    /// Queues a group for re-evaluation; already queued groups are kept once.
    pub fn queue_group_update(&mut self, group_id: ProxyGroupId) {
        if !self.group_updates.contains(&group_id) {
            self.group_updates.push(group_id);
        }
    }

    /// Queues a proxy for status flushing; already queued proxies are kept once.
    pub fn queue_proxy_update(&mut self, proxy_id: ProxyId) {
        if !self.proxy_updates.contains(&proxy_id) {
            self.proxy_updates.push(proxy_id);
        }
    }

    /// Records a pending proxy change for a host; `None` unassigns it.
    pub(crate) fn set_host_proxy(&mut self, host_id: HostId, proxy_id: Option<ProxyId>) {
        self.hostmap_updates.insert(host_id, proxy_id);
    }

    fn remove_group_update(&mut self, group_id: ProxyGroupId) {
        self.group_updates.retain(|queued| *queued != group_id);
    }
}
