//! Domain model for proxy groups.
//!
//! Proxies and groups are plain aggregates that own their health state
//! machines. They hold identifiers rather than references to each other;
//! the cache resolves those identifiers under its lock.

mod batch;
mod error;
mod group;
mod ids;
mod mapping;
mod proxy;
mod records;
mod relocation;
mod settings;
mod status;

pub use batch::{FlushBatch, FlushOutcome, StatusUpdate};
pub use error::{ParseGroupStatusError, ParseProxyStatusError, ProxyGroupDomainError};
pub use group::{ProxyCounts, ProxyGroup};
pub use ids::{HostId, HostProxyId, MapRevision, ProxyGroupId, ProxyId};
pub use mapping::HostProxyMapping;
pub use proxy::Proxy;
pub use records::{GroupRecord, HostGroupRecord, ProxyRecord};
pub use relocation::ObjectMove;
pub use settings::{
    DEFAULT_FAILOVER_DELAY, GroupSettings, REBALANCE_DELAY_FACTOR, parse_min_online,
    parse_time_suffix,
};
pub use status::{GroupStatus, ProxyStatus, StatusChange};
