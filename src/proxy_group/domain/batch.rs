//! Pending changes drained from the cache and handed to a store.

use super::{
    GroupStatus, HostProxyMapping, MapRevision, ProxyGroupId, ProxyId, ProxyStatus,
};
use serde::Serialize;

/// A status value to write back for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusUpdate<I, S> {
    /// Object whose status changed.
    pub id: I,
    /// Status to persist.
    pub status: S,
}

/// Everything one flush cycle must persist, captured at a single drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushBatch {
    /// Changed group statuses.
    pub group_updates: Vec<StatusUpdate<ProxyGroupId, GroupStatus>>,
    /// Changed proxy statuses.
    pub proxy_updates: Vec<StatusUpdate<ProxyId, ProxyStatus>>,
    /// Mappings to insert; their row identifiers are assigned by the store.
    pub new_mappings: Vec<HostProxyMapping>,
    /// Persisted mappings now pointing at another proxy.
    pub modified_mappings: Vec<HostProxyMapping>,
    /// Persisted mappings to delete.
    pub deleted_mappings: Vec<HostProxyMapping>,
    /// Groups whose mapped hosts changed in this batch.
    pub touched_groups: Vec<ProxyGroupId>,
    /// Mapping revision stamped on every new and modified mapping.
    pub revision: MapRevision,
}

impl FlushBatch {
    /// Returns whether any host mapping changes are present.
    #[must_use]
    pub fn has_mapping_changes(&self) -> bool {
        !(self.new_mappings.is_empty()
            && self.modified_mappings.is_empty()
            && self.deleted_mappings.is_empty())
    }

    /// Returns whether there is nothing to persist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.group_updates.is_empty() && self.proxy_updates.is_empty() && !self.has_mapping_changes()
    }
}

/// Result of persisting a [`FlushBatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// New mappings that were inserted, with their row identifiers.
    pub inserted: Vec<HostProxyMapping>,
    /// Stored mappings that already existed for hosts of new mappings.
    ///
    /// The stored row wins; the new mapping was not written.
    pub conflicting: Vec<HostProxyMapping>,
    /// New mappings dropped because their host no longer exists.
    pub vanished_hosts: Vec<HostProxyMapping>,
    /// New mappings dropped because their proxy no longer exists.
    pub vanished_proxies: Vec<HostProxyMapping>,
    /// Modified or deleted mapping rows actually written.
    pub rewritten_rows: usize,
}

impl FlushOutcome {
    /// Returns whether any mapping row was inserted, updated or deleted.
    #[must_use]
    pub fn wrote_mappings(&self) -> bool {
        self.rewritten_rows > 0 || !self.inserted.is_empty()
    }

    /// Returns the number of new mappings that were not inserted.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.conflicting.len() + self.vanished_hosts.len() + self.vanished_proxies.len()
    }
}
