//! In-memory store and topology source for tests and embedding.
//!
//! Thread-safe via an internal [`RwLock`]. The store emulates the cascading
//! deletes of the relational schema and can be told to report itself
//! unavailable for a number of flushes.

use crate::proxy_group::{
    domain::{
        FlushBatch, FlushOutcome, GroupRecord, GroupStatus, HostGroupRecord, HostId,
        HostProxyId, HostProxyMapping, MapRevision, ProxyGroupId, ProxyId, ProxyRecord,
        ProxyStatus,
    },
    ports::{ProxyGroupStore, StoreError, StoreResult, TopologySource},
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory proxy group store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProxyGroupStore {
    state: Arc<RwLock<InMemoryStoreState>>,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    groups: BTreeMap<ProxyGroupId, (GroupRecord, GroupStatus)>,
    proxies: BTreeMap<ProxyId, (ProxyRecord, ProxyStatus)>,
    hosts: BTreeMap<HostId, Option<ProxyGroupId>>,
    mappings: BTreeMap<HostProxyId, HostProxyMapping>,
    next_row_id: u64,
    revision: MapRevision,
    failing_flushes: usize,
    flush_attempts: usize,
}

fn lock_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::persistence(std::io::Error::other(err.to_string()))
}

fn unavailable() -> StoreError {
    StoreError::unavailable(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "in-memory store marked unavailable",
    ))
}

impl InMemoryProxyGroupStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write<T>(&self, apply: impl FnOnce(&mut InMemoryStoreState) -> T) -> StoreResult<T> {
        let mut state = self.state.write().map_err(lock_error)?;
        Ok(apply(&mut state))
    }

    fn read<T>(&self, inspect: impl FnOnce(&InMemoryStoreState) -> T) -> StoreResult<T> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(inspect(&state))
    }

    /// Creates or replaces a group definition, keeping its stored status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn upsert_group(&self, record: GroupRecord) -> StoreResult<()> {
        self.write(|state| {
            let status = state
                .groups
                .get(&record.id)
                .map_or(GroupStatus::Unknown, |(_, status)| *status);
            state.groups.insert(record.id, (record, status));
        })
    }

    /// Deletes a group; its hosts and proxies lose their group reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn remove_group(&self, group_id: ProxyGroupId) -> StoreResult<()> {
        self.write(|state| {
            state.groups.remove(&group_id);
            for group in state.hosts.values_mut() {
                if *group == Some(group_id) {
                    *group = None;
                }
            }
            for (record, _) in state.proxies.values_mut() {
                if record.group == Some(group_id) {
                    record.group = None;
                }
            }
        })
    }

    /// Creates or replaces a proxy definition, keeping its stored status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn upsert_proxy(&self, record: ProxyRecord) -> StoreResult<()> {
        self.write(|state| {
            let status = state
                .proxies
                .get(&record.id)
                .map_or(ProxyStatus::Unknown, |(_, status)| *status);
            state.proxies.insert(record.id, (record, status));
        })
    }

    /// Deletes a proxy together with its host mappings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn remove_proxy(&self, proxy_id: ProxyId) -> StoreResult<()> {
        self.write(|state| {
            state.proxies.remove(&proxy_id);
            state.mappings.retain(|_, mapping| mapping.proxy_id != proxy_id);
        })
    }

    /// Records the last contact time of a proxy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn set_last_access(
        &self,
        proxy_id: ProxyId,
        last_access: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.write(|state| {
            if let Some((record, _)) = state.proxies.get_mut(&proxy_id) {
                record.last_access = last_access;
            }
        })
    }

    /// Creates a host or changes its configured group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn set_host_group(&self, host_id: HostId, group: Option<ProxyGroupId>) -> StoreResult<()> {
        self.write(|state| {
            state.hosts.insert(host_id, group);
        })
    }

    /// Deletes a host together with its mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn remove_host(&self, host_id: HostId) -> StoreResult<()> {
        self.write(|state| {
            state.hosts.remove(&host_id);
            state.mappings.retain(|_, mapping| mapping.host_id != host_id);
        })
    }

    /// Seeds a persisted mapping, assigning a row identifier when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn insert_mapping(&self, mapping: HostProxyMapping) -> StoreResult<HostProxyMapping> {
        self.write(|state| {
            let row_id = mapping.row_id.unwrap_or_else(|| state.allocate_row_id());
            let stored = HostProxyMapping {
                row_id: Some(row_id),
                ..mapping
            };
            state.mappings.insert(row_id, stored);
            stored
        })
    }

    /// Makes the next `count` flushes fail as unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn fail_next_flushes(&self, count: usize) -> StoreResult<()> {
        self.write(|state| state.failing_flushes = count)
    }

    /// Returns the stored status of a group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn group_status(&self, group_id: ProxyGroupId) -> StoreResult<Option<GroupStatus>> {
        self.read(|state| state.groups.get(&group_id).map(|(_, status)| *status))
    }

    /// Returns the stored status of a proxy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn proxy_status(&self, proxy_id: ProxyId) -> StoreResult<Option<ProxyStatus>> {
        self.read(|state| state.proxies.get(&proxy_id).map(|(_, status)| *status))
    }

    /// Returns every stored mapping ordered by row identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn mappings(&self) -> StoreResult<Vec<HostProxyMapping>> {
        self.read(|state| state.mappings.values().copied().collect())
    }

    /// Returns the stored mapping revision watermark.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn stored_revision(&self) -> StoreResult<MapRevision> {
        self.read(|state| state.revision)
    }

    /// Returns how many flushes were attempted, including failed ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persistence`] when the internal lock is poisoned.
    pub fn flush_attempts(&self) -> StoreResult<usize> {
        self.read(|state| state.flush_attempts)
    }
}

impl InMemoryStoreState {
    fn allocate_row_id(&mut self) -> HostProxyId {
        self.next_row_id += 1;
        HostProxyId::new(self.next_row_id)
    }

    fn apply(&mut self, batch: &FlushBatch) -> FlushOutcome {
        for update in &batch.group_updates {
            if let Some((_, status)) = self.groups.get_mut(&update.id) {
                *status = update.status;
            }
        }
        for update in &batch.proxy_updates {
            if let Some((_, status)) = self.proxies.get_mut(&update.id) {
                *status = update.status;
            }
        }

        let mut outcome = FlushOutcome::default();
        for mapping in &batch.modified_mappings {
            let stored = mapping
                .row_id
                .and_then(|row_id| self.mappings.get_mut(&row_id));
            if let Some(stored) = stored {
                stored.proxy_id = mapping.proxy_id;
                stored.revision = mapping.revision;
                outcome.rewritten_rows += 1;
            }
        }
        for mapping in &batch.deleted_mappings {
            let removed = mapping
                .row_id
                .and_then(|row_id| self.mappings.remove(&row_id));
            if removed.is_some() {
                outcome.rewritten_rows += 1;
            }
        }

        for mapping in &batch.new_mappings {
            if !self.hosts.contains_key(&mapping.host_id) {
                outcome.vanished_hosts.push(*mapping);
                continue;
            }
            if !self.proxies.contains_key(&mapping.proxy_id) {
                outcome.vanished_proxies.push(*mapping);
                continue;
            }
            // One row per host, as enforced by the relational schema.
            let existing = self
                .mappings
                .values()
                .find(|stored| stored.host_id == mapping.host_id);
            if let Some(existing) = existing {
                outcome.conflicting.push(*existing);
                continue;
            }
            let row_id = self.allocate_row_id();
            let stored = HostProxyMapping {
                row_id: Some(row_id),
                ..*mapping
            };
            self.mappings.insert(row_id, stored);
            outcome.inserted.push(stored);
        }

        if outcome.wrote_mappings() {
            self.revision = self.revision.max(batch.revision);
        }
        outcome
    }
}

impl ProxyGroupStore for InMemoryProxyGroupStore {
    fn load_hostmap_revision(&self) -> StoreResult<MapRevision> {
        self.stored_revision()
    }

    fn load_host_groups(&self) -> StoreResult<Vec<HostGroupRecord>> {
        self.read(|state| {
            state
                .hosts
                .iter()
                .filter_map(|(host_id, group)| {
                    group.map(|group_id| HostGroupRecord {
                        host_id: *host_id,
                        group_id,
                    })
                })
                .collect()
        })
    }

    fn load_mappings(&self) -> StoreResult<Vec<HostProxyMapping>> {
        self.mappings()
    }

    fn flush(&self, batch: &FlushBatch) -> StoreResult<FlushOutcome> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.flush_attempts += 1;
        if state.failing_flushes > 0 {
            state.failing_flushes -= 1;
            return Err(unavailable());
        }
        Ok(state.apply(batch))
    }
}

impl TopologySource for InMemoryProxyGroupStore {
    fn fetch_groups(&self) -> StoreResult<Vec<GroupRecord>> {
        self.read(|state| state.groups.values().map(|(record, _)| record.clone()).collect())
    }

    fn fetch_proxies(&self) -> StoreResult<Vec<ProxyRecord>> {
        self.read(|state| {
            state
                .proxies
                .values()
                .map(|(record, _)| record.clone())
                .collect()
        })
    }
}
