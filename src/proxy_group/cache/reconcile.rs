//! Reconciliation of cached topology against upstream snapshots.

use super::CacheState;
use crate::proxy_group::domain::{
    GroupRecord, HostGroupRecord, HostProxyMapping, ObjectMove, Proxy, ProxyGroup, ProxyGroupId,
    ProxyId, ProxyRecord,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

impl CacheState {
    /// Applies a full snapshot of group definitions.
    ///
    /// New groups start in `Unknown`; changed definitions are queued and
    /// groups missing from the snapshot are destroyed.
    pub fn apply_group_records(&mut self, records: &[GroupRecord]) {
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            seen.insert(record.id);
            let changed = self.groups.get_mut(&record.id).map(|group| {
                group.reconfigure(&record.name, &record.failover_delay, &record.min_online)
            });
            match changed {
                Some(true) => self.queue_group_update(record.id),
                Some(false) => {}
                None => {
                    debug!(group_id = %record.id, name = %record.name, "adding proxy group");
                    self.groups.insert(
                        record.id,
                        ProxyGroup::new(
                            record.id,
                            record.name.clone(),
                            record.failover_delay.clone(),
                            record.min_online.clone(),
                        ),
                    );
                    self.queue_group_update(record.id);
                }
            }
        }

        let removed: Vec<ProxyGroupId> = self
            .groups
            .keys()
            .filter(|group_id| !seen.contains(*group_id))
            .copied()
            .collect();
        for group_id in removed {
            debug!(%group_id, "removing deleted proxy group");
            self.destroy_group(group_id);
        }
    }

    /// Applies a full snapshot of proxy definitions.
    ///
    /// Only proxies belonging to a known group are cached. Returns the
    /// relocations derived from comparing each record with the cached
    /// back-reference, after applying them.
    pub fn apply_proxy_records(&mut self, records: &[ProxyRecord]) -> Vec<ObjectMove<ProxyId>> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut relocations = Vec::new();

        for record in records {
            seen.insert(record.id);
            let destination = record
                .group
                .filter(|group_id| self.groups.contains_key(group_id));

            let source = match self.proxies.get_mut(&record.id) {
                Some(proxy) => {
                    proxy.rename(record.name.as_str());
                    proxy.set_last_access(record.last_access);
                    proxy.group()
                }
                None if destination.is_some() => {
                    let mut proxy = Proxy::new(record.id, record.name.as_str());
                    proxy.set_last_access(record.last_access);
                    self.proxies.insert(record.id, proxy);
                    None
                }
                None => continue,
            };

            if source != destination {
                relocations.push(ObjectMove {
                    object_id: record.id,
                    source,
                    destination,
                });
            }
        }

        let removed: Vec<ProxyId> = self
            .proxies
            .keys()
            .filter(|proxy_id| !seen.contains(*proxy_id))
            .copied()
            .collect();
        for proxy_id in removed {
            debug!(%proxy_id, "removing deleted proxy");
            self.free_proxy(proxy_id);
        }

        for relocation in &relocations {
            self.apply_proxy_move(*relocation);
        }
        relocations
    }

    /// Loads the persisted host to group configuration.
    pub fn load_host_groups(&mut self, records: &[HostGroupRecord]) {
        for record in records {
            self.add_host_to_group(record.group_id, record.host_id);
        }
    }

    /// Loads persisted mappings, reconstructing each proxy's host list.
    ///
    /// Proxies serving hosts are assumed online as of `now`. Mappings whose
    /// proxy is unknown or belongs to a group other than the host's are
    /// installed and immediately queued for deletion.
    pub fn load_mappings(&mut self, mappings: &[HostProxyMapping], now: DateTime<Utc>) {
        for mapping in mappings {
            let host_group = self.host_groups.get(&mapping.host_id).copied();
            let proxy_group = self
                .proxies
                .get(&mapping.proxy_id)
                .and_then(Proxy::group);
            self.hostmap.insert(mapping.host_id, *mapping);

            if host_group.is_none() || host_group != proxy_group {
                debug!(
                    host_id = %mapping.host_id,
                    proxy_id = %mapping.proxy_id,
                    "discarding stale host mapping"
                );
                self.set_host_proxy(mapping.host_id, None);
                continue;
            }

            if let Some(proxy) = self.proxies.get_mut(&mapping.proxy_id) {
                proxy.attach_host(mapping.host_id);
                proxy.assume_online(now);
            }
            if let Some(group) = host_group.and_then(|group_id| self.groups.get_mut(&group_id)) {
                group.drop_unassigned(mapping.host_id);
            }
        }
    }
}
