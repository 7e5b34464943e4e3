//! Draining pending updates into a flush batch and applying flush results.

use super::CacheState;
use crate::proxy_group::domain::{
    FlushBatch, FlushOutcome, GroupStatus, HostProxyMapping, MapRevision, Proxy, ProxyGroupId,
    ProxyId, StatusUpdate,
};
use std::collections::BTreeSet;
use tracing::debug;

impl CacheState {
    /// Takes every pending change in one step.
    ///
    /// Status updates are collected from queued groups, their proxies and
    /// queued proxies. Pending host-map changes are split into new, modified
    /// and deleted mappings stamped with one freshly bumped revision;
    /// modifications and deletions are applied to the installed mappings
    /// right away. Groups in `Recovery` or still unbalanced stay queued.
    pub fn drain_updates(&mut self) -> FlushBatch {
        let mut batch = FlushBatch::default();
        self.drain_status_updates(&mut batch);
        self.drain_hostmap_updates(&mut batch);

        let groups = &self.groups;
        self.group_updates.retain(|group_id| {
            groups.get(group_id).is_some_and(|group| {
                group.status() == GroupStatus::Recovery || group.is_unbalanced()
            })
        });

        debug!(
            groups = batch.group_updates.len(),
            proxies = batch.proxy_updates.len(),
            added = batch.new_mappings.len(),
            updated = batch.modified_mappings.len(),
            removed = batch.deleted_mappings.len(),
            "drained proxy group updates"
        );
        batch
    }

    fn drain_status_updates(&mut self, batch: &mut FlushBatch) {
        let mut proxy_ids: Vec<ProxyId> = Vec::new();
        for group_id in &self.group_updates {
            let Some(group) = self.groups.get_mut(group_id) else {
                continue;
            };
            if group.is_status_dirty() {
                batch.group_updates.push(StatusUpdate {
                    id: *group_id,
                    status: group.status(),
                });
                group.clear_status_dirty();
            }
            proxy_ids.extend_from_slice(group.proxies());
        }
        proxy_ids.append(&mut self.proxy_updates);

        for proxy_id in proxy_ids {
            let Some(proxy) = self.proxies.get_mut(&proxy_id) else {
                continue;
            };
            if proxy.is_status_dirty() {
                batch.proxy_updates.push(StatusUpdate {
                    id: proxy_id,
                    status: proxy.status(),
                });
                proxy.clear_status_dirty();
            }
        }
    }

    fn drain_hostmap_updates(&mut self, batch: &mut FlushBatch) {
        if self.hostmap_updates.is_empty() {
            batch.revision = self.hostmap_revision;
            return;
        }
        self.hostmap_revision = self.hostmap_revision.next();
        let revision = self.hostmap_revision;
        batch.revision = revision;

        let mut touched = BTreeSet::new();
        for (host_id, target) in std::mem::take(&mut self.hostmap_updates) {
            let Some(existing) = self.hostmap.get(&host_id).copied() else {
                if let Some(proxy_id) = target {
                    batch
                        .new_mappings
                        .push(HostProxyMapping::pending(host_id, proxy_id, revision));
                }
                continue;
            };
            touched.extend(self.proxy_group_of(existing.proxy_id));

            match target {
                None => {
                    self.hostmap.remove(&host_id);
                    if let Some(proxy) = self.proxies.get_mut(&existing.proxy_id) {
                        proxy.detach_host(host_id);
                    }
                    batch.deleted_mappings.push(existing);
                }
                Some(proxy_id) => {
                    let updated = HostProxyMapping {
                        proxy_id,
                        revision,
                        ..existing
                    };
                    self.hostmap.insert(host_id, updated);
                    if let Some(previous) = self.proxies.get_mut(&existing.proxy_id) {
                        previous.detach_host(host_id);
                    }
                    if let Some(proxy) = self.proxies.get_mut(&proxy_id) {
                        proxy.attach_host(host_id);
                    }
                    touched.extend(self.proxy_group_of(proxy_id));
                    batch.modified_mappings.push(updated);
                }
            }
        }
        batch.touched_groups = touched.into_iter().collect();
    }

    fn proxy_group_of(&self, proxy_id: ProxyId) -> Option<ProxyGroupId> {
        self.proxies.get(&proxy_id).and_then(Proxy::group)
    }

    /// Applies the result of a successful flush.
    ///
    /// Inserted mappings are installed; any whose host or proxy left the
    /// group since the drain is queued for deletion. Stored rows that beat a
    /// new mapping are adopted the same way. Hosts whose row vanished are
    /// forgotten, while hosts of vanished proxies go back on the unassigned
    /// list. Watermarks of touched groups are raised to the batch revision
    /// only when a mapping row was written; otherwise the revision drawn by
    /// the drain is given back.
    pub fn complete_flush(&mut self, batch: &FlushBatch, outcome: &FlushOutcome) {
        let mut touched: BTreeSet<ProxyGroupId> = batch.touched_groups.iter().copied().collect();
        touched.extend(self.install_new_mappings(&outcome.inserted));
        touched.extend(self.install_new_mappings(&outcome.conflicting));
        self.forget_vanished_hosts(&outcome.vanished_hosts);
        self.restore_unassigned(&outcome.vanished_proxies);

        if outcome.wrote_mappings() {
            let group_ids: Vec<ProxyGroupId> = touched.into_iter().collect();
            self.advance_hostmap_revision(&group_ids, batch.revision);
        } else {
            self.release_hostmap_revision(batch);
        }
    }

    /// Gives back the revision drawn for `batch` when none was persisted.
    ///
    /// Only the latest drawn revision can be released.
    pub fn release_hostmap_revision(&mut self, batch: &FlushBatch) {
        if batch.has_mapping_changes() && self.hostmap_revision == batch.revision {
            self.hostmap_revision = batch.revision.previous();
        }
    }

    /// Installs persisted new mappings and returns the groups they belong to.
    pub fn install_new_mappings(&mut self, inserted: &[HostProxyMapping]) -> Vec<ProxyGroupId> {
        let mut groups = Vec::new();
        for mapping in inserted {
            self.hostmap.insert(mapping.host_id, *mapping);

            if self.hostmap_updates.contains_key(&mapping.host_id) {
                continue;
            }

            let proxy_group = self.proxy_group_of(mapping.proxy_id);
            let host_group = self.host_groups.get(&mapping.host_id).copied();
            let Some(group_id) = proxy_group.filter(|_| proxy_group == host_group) else {
                debug!(
                    host_id = %mapping.host_id,
                    proxy_id = %mapping.proxy_id,
                    "host left its proxy group during flush, removing mapping"
                );
                self.set_host_proxy(mapping.host_id, None);
                continue;
            };

            if let Some(proxy) = self.proxies.get_mut(&mapping.proxy_id) {
                proxy.attach_host(mapping.host_id);
            }
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.drop_unassigned(mapping.host_id);
            }
            groups.push(group_id);
        }
        groups
    }

    /// Returns hosts of mappings dropped by the store to their groups'
    /// unassigned lists.
    ///
    /// Hosts that already have an assignment or left their group are left
    /// alone.
    pub fn restore_unassigned(&mut self, skipped: &[HostProxyMapping]) {
        for mapping in skipped {
            let Some(group_id) = self.host_groups.get(&mapping.host_id).copied() else {
                continue;
            };
            if self.effective_proxy(mapping.host_id).is_some() {
                continue;
            }
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.push_unassigned(mapping.host_id);
            }
            self.queue_group_update(group_id);
        }
    }

    /// Drops hosts whose rows were deleted before their mapping was stored.
    ///
    /// A host that received a newer assignment since the drain is kept.
    pub fn forget_vanished_hosts(&mut self, vanished: &[HostProxyMapping]) {
        for mapping in vanished {
            let host_id = mapping.host_id;
            if self.hostmap_updates.contains_key(&host_id) || self.hostmap.contains_key(&host_id) {
                continue;
            }
            let Some(group_id) = self.host_groups.get(&host_id).copied() else {
                continue;
            };
            debug!(%host_id, %group_id, "host vanished before its mapping was stored");
            self.remove_host_from_group(group_id, host_id);
        }
    }

    /// Raises the durable watermark of each named group to `revision`.
    ///
    /// Watermarks never move backwards.
    pub fn advance_hostmap_revision(&mut self, group_ids: &[ProxyGroupId], revision: MapRevision) {
        for group_id in group_ids {
            if let Some(group) = self.groups.get_mut(group_id) {
                group.advance_hostmap_revision(revision);
            }
        }
    }
}
