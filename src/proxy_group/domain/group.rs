//! Proxy group aggregate and the group health state machine.

use super::{GroupSettings, GroupStatus, HostId, MapRevision, ProxyGroupId, ProxyId, StatusChange};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Per-status proxy counts used by a group evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyCounts {
    /// Number of proxies in the group.
    pub total: usize,
    /// Proxies whose status is `Online`.
    pub online: usize,
    /// Proxies whose status is `Offline`.
    pub offline: usize,
    /// Online proxies whose last contact is comfortably inside the window.
    pub healthy: usize,
}

/// A proxy group with its configured hosts and runtime health state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyGroup {
    id: ProxyGroupId,
    name: String,
    failover_delay: String,
    min_online: String,
    status: GroupStatus,
    status_time: Option<DateTime<Utc>>,
    hostmap_revision: MapRevision,
    status_dirty: bool,
    proxies: Vec<ProxyId>,
    hosts: BTreeSet<HostId>,
    unassigned: Vec<HostId>,
    balance_deadline: Option<DateTime<Utc>>,
    unbalanced: bool,
}

impl ProxyGroup {
    /// Creates a group in the `Unknown` status.
    #[must_use]
    pub fn new(
        id: ProxyGroupId,
        name: impl Into<String>,
        failover_delay: impl Into<String>,
        min_online: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            failover_delay: failover_delay.into(),
            min_online: min_online.into(),
            status: GroupStatus::Unknown,
            status_time: None,
            hostmap_revision: MapRevision::ZERO,
            status_dirty: false,
            proxies: Vec::new(),
            hosts: BTreeSet::new(),
            unassigned: Vec::new(),
            balance_deadline: None,
            unbalanced: false,
        }
    }

    /// Returns the group identifier.
    #[must_use]
    pub const fn id(&self) -> ProxyGroupId {
        self.id
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the unexpanded failover delay expression.
    #[must_use]
    pub fn failover_delay(&self) -> &str {
        &self.failover_delay
    }

    /// Returns the unexpanded minimum-online expression.
    #[must_use]
    pub fn min_online(&self) -> &str {
        &self.min_online
    }

    /// Returns the current health status.
    #[must_use]
    pub const fn status(&self) -> GroupStatus {
        self.status
    }

    /// Returns when the status last changed.
    #[must_use]
    pub const fn status_time(&self) -> Option<DateTime<Utc>> {
        self.status_time
    }

    /// Returns the highest mapping revision known to be durable.
    #[must_use]
    pub const fn hostmap_revision(&self) -> MapRevision {
        self.hostmap_revision
    }

    /// Returns whether the status changed since the last flush.
    #[must_use]
    pub const fn is_status_dirty(&self) -> bool {
        self.status_dirty
    }

    /// Returns the proxies of the group, in insertion order.
    #[must_use]
    pub fn proxies(&self) -> &[ProxyId] {
        &self.proxies
    }

    /// Returns the hosts configured into the group.
    #[must_use]
    pub const fn hosts(&self) -> &BTreeSet<HostId> {
        &self.hosts
    }

    /// Returns configured hosts that have no live mapping.
    #[must_use]
    pub fn unassigned(&self) -> &[HostId] {
        &self.unassigned
    }

    /// Returns when a pending rebalance becomes due, if one is scheduled.
    #[must_use]
    pub const fn balance_deadline(&self) -> Option<DateTime<Utc>> {
        self.balance_deadline
    }

    /// Returns whether the last balance check found the group unbalanced.
    #[must_use]
    pub const fn is_unbalanced(&self) -> bool {
        self.unbalanced
    }

    /// Replaces the configuration strings.
    ///
    /// Returns `true` when any of them changed.
    pub fn reconfigure(&mut self, name: &str, failover_delay: &str, min_online: &str) -> bool {
        let changed = self.name != name
            || self.failover_delay != failover_delay
            || self.min_online != min_online;
        if changed {
            name.clone_into(&mut self.name);
            failover_delay.clone_into(&mut self.failover_delay);
            min_online.clone_into(&mut self.min_online);
        }
        changed
    }

    /// Raises the durable mapping watermark; older values are ignored.
    pub fn advance_hostmap_revision(&mut self, revision: MapRevision) {
        self.hostmap_revision = self.hostmap_revision.max(revision);
    }

    pub(crate) fn add_proxy(&mut self, proxy_id: ProxyId) -> bool {
        if self.proxies.contains(&proxy_id) {
            return false;
        }
        self.proxies.push(proxy_id);
        true
    }

    pub(crate) fn remove_proxy(&mut self, proxy_id: ProxyId) -> bool {
        let before = self.proxies.len();
        self.proxies.retain(|candidate| *candidate != proxy_id);
        self.proxies.len() != before
    }

    pub(crate) fn add_host(&mut self, host_id: HostId) -> bool {
        self.hosts.insert(host_id)
    }

    pub(crate) fn remove_host(&mut self, host_id: HostId) -> bool {
        self.unassigned.retain(|candidate| *candidate != host_id);
        self.hosts.remove(&host_id)
    }

    pub(crate) fn take_hosts(&mut self) -> BTreeSet<HostId> {
        self.unassigned.clear();
        std::mem::take(&mut self.hosts)
    }

    pub(crate) fn push_unassigned(&mut self, host_id: HostId) {
        if self.hosts.contains(&host_id) && !self.unassigned.contains(&host_id) {
            self.unassigned.push(host_id);
        }
    }

    pub(crate) fn drop_unassigned(&mut self, host_id: HostId) {
        self.unassigned.retain(|candidate| *candidate != host_id);
    }

    pub(crate) fn pop_unassigned(&mut self) -> Option<HostId> {
        self.unassigned.pop()
    }

    pub(crate) const fn set_balance_deadline(&mut self, deadline: Option<DateTime<Utc>>) {
        self.balance_deadline = deadline;
    }

    pub(crate) const fn set_unbalanced(&mut self, unbalanced: bool) {
        self.unbalanced = unbalanced;
    }

    pub(crate) const fn clear_status_dirty(&mut self) {
        self.status_dirty = false;
    }

    /// Runs one step of the group health state machine.
    ///
    /// `Unknown` moves to `Recovery` immediately and the `Recovery` rule is
    /// applied in the same step. Any resulting change stamps `status_time`
    /// and marks the status dirty.
    pub fn evaluate_status(
        &mut self,
        counts: ProxyCounts,
        now: DateTime<Utc>,
        settings: GroupSettings,
    ) -> Option<StatusChange<GroupStatus>> {
        let mut current = self.status;
        if current == GroupStatus::Unknown {
            current = GroupStatus::Recovery;
            self.status_time = Some(now);
        }

        let window_elapsed = self
            .status_time
            .is_none_or(|since| now - since > settings.failover_delay);
        let target = next_group_status(current, counts, settings.min_online, window_elapsed);

        if target == self.status {
            return None;
        }
        let change = StatusChange {
            from: self.status,
            to: target,
        };
        self.status = target;
        self.status_time = Some(now);
        self.status_dirty = true;
        Some(change)
    }
}

/// Applies the group transition table to a status that is not `Unknown`.
const fn next_group_status(
    current: GroupStatus,
    counts: ProxyCounts,
    min_online: usize,
    window_elapsed: bool,
) -> GroupStatus {
    match current {
        GroupStatus::Unknown | GroupStatus::Recovery => {
            if counts.total.saturating_sub(counts.offline) < min_online {
                GroupStatus::Offline
            } else if counts.online == counts.total {
                GroupStatus::Online
            } else if !window_elapsed {
                GroupStatus::Recovery
            } else if counts.online >= min_online {
                GroupStatus::Online
            } else {
                GroupStatus::Offline
            }
        }
        GroupStatus::Decay => {
            if counts.healthy >= min_online {
                GroupStatus::Online
            } else if counts.online < min_online {
                GroupStatus::Offline
            } else {
                GroupStatus::Decay
            }
        }
        GroupStatus::Offline if counts.online >= min_online => GroupStatus::Recovery,
        GroupStatus::Online if counts.healthy < min_online => GroupStatus::Decay,
        GroupStatus::Offline | GroupStatus::Online => current,
    }
}
