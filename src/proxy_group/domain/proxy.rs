//! Proxy aggregate and the proxy health state machine.

use super::{HostId, ProxyGroupId, ProxyId, ProxyStatus, StatusChange};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// A proxy known to the manager, with its runtime health state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proxy {
    id: ProxyId,
    name: String,
    status: ProxyStatus,
    last_access: Option<DateTime<Utc>>,
    first_access: Option<DateTime<Utc>>,
    group: Option<ProxyGroupId>,
    hosts: BTreeSet<HostId>,
    status_dirty: bool,
}

impl Proxy {
    /// Creates a proxy in the `Unknown` status with no recorded contact.
    #[must_use]
    pub fn new(id: ProxyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ProxyStatus::Unknown,
            last_access: None,
            first_access: None,
            group: None,
            hosts: BTreeSet::new(),
            status_dirty: false,
        }
    }

    /// Returns the proxy identifier.
    #[must_use]
    pub const fn id(&self) -> ProxyId {
        self.id
    }

    /// Returns the proxy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current health status.
    #[must_use]
    pub const fn status(&self) -> ProxyStatus {
        self.status
    }

    /// Returns the last time the proxy contacted the server.
    #[must_use]
    pub const fn last_access(&self) -> Option<DateTime<Utc>> {
        self.last_access
    }

    /// Returns the start of the current unbroken contact streak.
    #[must_use]
    pub const fn first_access(&self) -> Option<DateTime<Utc>> {
        self.first_access
    }

    /// Returns the owning group, if any.
    #[must_use]
    pub const fn group(&self) -> Option<ProxyGroupId> {
        self.group
    }

    /// Returns the hosts currently mapped to this proxy.
    #[must_use]
    pub const fn hosts(&self) -> &BTreeSet<HostId> {
        &self.hosts
    }

    /// Returns whether the status changed since the last flush.
    #[must_use]
    pub const fn is_status_dirty(&self) -> bool {
        self.status_dirty
    }

    /// Renames the proxy.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Records the latest contact time reported upstream.
    pub const fn set_last_access(&mut self, last_access: Option<DateTime<Utc>>) {
        self.last_access = last_access;
    }

    /// Marks a proxy with live mappings as recently healthy.
    ///
    /// Used while loading persisted mappings, before any contact data is
    /// available.
    pub const fn assume_online(&mut self, now: DateTime<Utc>) {
        self.status = ProxyStatus::Online;
        self.last_access = Some(now);
    }

    pub(crate) const fn set_group(&mut self, group: Option<ProxyGroupId>) {
        self.group = group;
    }

    pub(crate) fn attach_host(&mut self, host_id: HostId) {
        self.hosts.insert(host_id);
    }

    pub(crate) fn detach_host(&mut self, host_id: HostId) -> bool {
        self.hosts.remove(&host_id)
    }

    pub(crate) fn take_hosts(&mut self) -> BTreeSet<HostId> {
        std::mem::take(&mut self.hosts)
    }

    pub(crate) const fn clear_status_dirty(&mut self) {
        self.status_dirty = false;
    }

    /// Runs one step of the proxy health state machine.
    ///
    /// A proxy silent for `delay` becomes `Offline`, but only once the
    /// manager itself has been up for `delay`. A proxy in contact becomes
    /// `Online` after `delay` of unbroken contact. Otherwise the status is
    /// kept; `Unknown` is never re-entered.
    pub fn evaluate_status(
        &mut self,
        now: DateTime<Utc>,
        startup: DateTime<Utc>,
        delay: TimeDelta,
    ) -> Option<StatusChange<ProxyStatus>> {
        let silent = self
            .last_access
            .is_none_or(|last_access| now - last_access >= delay);

        let target = if silent {
            if now - startup >= delay {
                self.first_access = None;
                Some(ProxyStatus::Offline)
            } else {
                None
            }
        } else {
            let streak_start = match (self.first_access, self.last_access) {
                (Some(first_access), _) => Some(first_access),
                (None, last_access) => {
                    self.first_access = last_access;
                    last_access
                }
            };
            streak_start
                .filter(|first_access| now - *first_access >= delay)
                .map(|_| ProxyStatus::Online)
        };

        let to = target.filter(|status| *status != self.status)?;
        let change = StatusChange {
            from: self.status,
            to,
        };
        self.status = to;
        self.status_dirty = true;
        Some(change)
    }
}
