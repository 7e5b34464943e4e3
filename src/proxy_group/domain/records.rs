//! Upstream definition records consumed during topology reconciliation.

use super::{HostId, ProxyGroupId, ProxyId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A proxy group definition as stored upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group identifier.
    pub id: ProxyGroupId,
    /// Group name.
    pub name: String,
    /// Failover delay expression, possibly containing macros.
    pub failover_delay: String,
    /// Minimum-online expression, possibly containing macros.
    pub min_online: String,
}

/// A proxy definition as stored upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// Proxy identifier.
    pub id: ProxyId,
    /// Proxy name.
    pub name: String,
    /// Owning group, if any.
    pub group: Option<ProxyGroupId>,
    /// Last contact time, if the proxy ever connected.
    pub last_access: Option<DateTime<Utc>>,
}

/// A host configured into a proxy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroupRecord {
    /// Host identifier.
    pub host_id: HostId,
    /// Group the host is configured into.
    pub group_id: ProxyGroupId,
}
