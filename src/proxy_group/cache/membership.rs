//! Group membership changes for proxies and hosts.

use super::CacheState;
use crate::proxy_group::domain::{HostId, ObjectMove, ProxyGroupId, ProxyId};
use tracing::{debug, error};

impl CacheState {
    /// Adds a proxy to a group, detaching it from any previous group.
    ///
    /// Returns `false` when either object is unknown.
    pub fn add_proxy_to_group(&mut self, proxy_id: ProxyId, group_id: ProxyGroupId) -> bool {
        if !self.groups.contains_key(&group_id) {
            debug!(%proxy_id, %group_id, "cannot add proxy to unknown group");
            return false;
        }
        let Some(current) = self.proxies.get(&proxy_id).map(|proxy| proxy.group()) else {
            error!(%proxy_id, %group_id, "cannot add unknown proxy to group");
            return false;
        };

        match current {
            Some(existing) if existing == group_id => return true,
            Some(existing) => self.remove_proxy_from_group(existing, proxy_id),
            None => {}
        }

        if let Some(proxy) = self.proxies.get_mut(&proxy_id) {
            proxy.set_group(Some(group_id));
        }
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.add_proxy(proxy_id);
        }
        self.queue_group_update(group_id);
        true
    }

    /// Removes a proxy from a group.
    ///
    /// Hosts served by the proxy become unassigned and their mappings are
    /// queued for deletion or reassignment.
    pub fn remove_proxy_from_group(&mut self, group_id: ProxyGroupId, proxy_id: ProxyId) {
        let Some(proxy) = self.proxies.get_mut(&proxy_id) else {
            error!(%proxy_id, %group_id, "cannot remove unknown proxy from group");
            return;
        };
        if proxy.group() != Some(group_id) {
            debug!(%proxy_id, %group_id, "proxy is not a member of the group");
            return;
        }

        proxy.set_group(None);
        let hosts = proxy.take_hosts();
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.remove_proxy(proxy_id);
            for host_id in &hosts {
                group.push_unassigned(*host_id);
            }
        }
        for host_id in hosts {
            self.set_host_proxy(host_id, None);
        }
        self.queue_group_update(group_id);
    }

    /// Configures a host into a group.
    ///
    /// A host configured into another group is removed from it first. A host
    /// without a live mapping joins the group's unassigned list.
    pub fn add_host_to_group(&mut self, group_id: ProxyGroupId, host_id: HostId) {
        if !self.groups.contains_key(&group_id) {
            debug!(%host_id, %group_id, "cannot add host to unknown group");
            return;
        }
        let other_group = self
            .host_groups
            .get(&host_id)
            .copied()
            .filter(|previous| *previous != group_id);
        if let Some(previous) = other_group {
            self.remove_host_from_group(previous, host_id);
        }

        let mapped = self.effective_proxy(host_id).is_some();
        let added = self
            .groups
            .get_mut(&group_id)
            .is_some_and(|group| group.add_host(host_id));
        if added && !mapped {
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.push_unassigned(host_id);
            }
        }
        self.host_groups.insert(host_id, group_id);
        self.queue_group_update(group_id);
    }

    /// Revokes a host's group membership and queues its mapping for deletion.
    pub fn remove_host_from_group(&mut self, group_id: ProxyGroupId, host_id: HostId) {
        let Some(group) = self.groups.get_mut(&group_id) else {
            debug!(%host_id, %group_id, "cannot remove host from unknown group");
            return;
        };
        group.remove_host(host_id);
        if self.host_groups.get(&host_id) == Some(&group_id) {
            self.host_groups.remove(&host_id);
        }

        if let Some(mapping) = self.hostmap.get(&host_id).copied() {
            if let Some(proxy) = self.proxies.get_mut(&mapping.proxy_id) {
                proxy.detach_host(host_id);
            }
            self.set_host_proxy(host_id, None);
        } else if self.hostmap_updates.contains_key(&host_id) {
            self.set_host_proxy(host_id, None);
        }
        self.queue_group_update(group_id);
    }

    /// Applies a host relocation received from another process component.
    pub fn apply_host_move(&mut self, relocation: ObjectMove<HostId>) {
        if let Some(source) = relocation.source {
            self.remove_host_from_group(source, relocation.object_id);
        }
        if let Some(destination) = relocation.destination {
            self.add_host_to_group(destination, relocation.object_id);
        }
    }

    /// Applies a proxy relocation.
    ///
    /// The proxy leaves its current group; a proxy left without a group is
    /// dropped from the cache.
    pub fn apply_proxy_move(&mut self, relocation: ObjectMove<ProxyId>) {
        let proxy_id = relocation.object_id;
        let Some(current) = self.proxies.get(&proxy_id).map(|proxy| proxy.group()) else {
            error!(%proxy_id, "cannot relocate proxy missing from the cache");
            return;
        };

        if let Some(group_id) = current {
            self.remove_proxy_from_group(group_id, proxy_id);
        }

        let joined = relocation
            .destination
            .is_some_and(|group_id| self.add_proxy_to_group(proxy_id, group_id));
        if !joined {
            self.free_proxy(proxy_id);
        }
    }

    pub(super) fn free_proxy(&mut self, proxy_id: ProxyId) {
        if let Some(group_id) = self.proxies.get(&proxy_id).and_then(|proxy| proxy.group()) {
            self.remove_proxy_from_group(group_id, proxy_id);
        }
        self.proxies.remove(&proxy_id);
        self.proxy_updates.retain(|queued| *queued != proxy_id);
    }

    pub(super) fn destroy_group(&mut self, group_id: ProxyGroupId) {
        let Some(group) = self.groups.get(&group_id) else {
            return;
        };
        let proxies = group.proxies().to_vec();
        let hosts: Vec<HostId> = group.hosts().iter().copied().collect();

        for proxy_id in proxies {
            self.free_proxy(proxy_id);
        }
        for host_id in hosts {
            self.remove_host_from_group(group_id, host_id);
        }
        self.groups.remove(&group_id);
        self.remove_group_update(group_id);
    }
}
