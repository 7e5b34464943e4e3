//! Host to proxy mapping records.

use super::{HostId, HostProxyId, MapRevision, ProxyId};
use serde::{Deserialize, Serialize};

/// The durable record of which proxy serves a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProxyMapping {
    /// Mapped host.
    pub host_id: HostId,
    /// Serving proxy.
    pub proxy_id: ProxyId,
    /// Revision stamped when the mapping was last written.
    pub revision: MapRevision,
    /// Storage row identifier; `None` until the mapping is first persisted.
    pub row_id: Option<HostProxyId>,
}

impl HostProxyMapping {
    /// Creates a mapping that has not been persisted yet.
    #[must_use]
    pub const fn pending(host_id: HostId, proxy_id: ProxyId, revision: MapRevision) -> Self {
        Self {
            host_id,
            proxy_id,
            revision,
            row_id: None,
        }
    }
}
