//! Serializable point-in-time view of the cache, used for trace dumps.

use super::CacheState;
use crate::proxy_group::domain::{
    HostId, HostProxyMapping, MapRevision, Proxy, ProxyGroup, ProxyGroupId, ProxyId,
};
use serde::Serialize;

/// A copy of the cache contents ordered by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    /// Cached groups.
    pub groups: Vec<ProxyGroup>,
    /// Cached proxies.
    pub proxies: Vec<Proxy>,
    /// Installed host mappings.
    pub hostmap: Vec<HostProxyMapping>,
    /// Pending host-map changes not yet drained.
    pub hostmap_updates: Vec<(HostId, Option<ProxyId>)>,
    /// Groups queued for re-evaluation.
    pub group_updates: Vec<ProxyGroupId>,
    /// Latest mapping revision handed out by a drain.
    pub hostmap_revision: MapRevision,
}

impl CacheState {
    /// Copies the cache contents into a [`CacheSnapshot`].
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut groups: Vec<ProxyGroup> = self.groups.values().cloned().collect();
        groups.sort_unstable_by_key(ProxyGroup::id);
        let mut proxies: Vec<Proxy> = self.proxies.values().cloned().collect();
        proxies.sort_unstable_by_key(Proxy::id);
        let mut hostmap: Vec<HostProxyMapping> = self.hostmap.values().copied().collect();
        hostmap.sort_unstable_by_key(|mapping| mapping.host_id);

        CacheSnapshot {
            groups,
            proxies,
            hostmap,
            hostmap_updates: self
                .hostmap_updates
                .iter()
                .map(|(host_id, proxy_id)| (*host_id, *proxy_id))
                .collect(),
            group_updates: self.group_updates.clone(),
            hostmap_revision: self.hostmap_revision,
        }
    }
}
