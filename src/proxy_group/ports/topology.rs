//! Port to the upstream configuration holding group and proxy definitions.

use super::StoreResult;
use crate::proxy_group::domain::{GroupRecord, ProxyRecord};

/// Source of group and proxy definitions, polled by the manager.
pub trait TopologySource: Send + Sync {
    /// Returns every proxy group definition.
    ///
    /// # Errors
    ///
    /// Returns a [`super::StoreError`] when the definitions cannot be read.
    fn fetch_groups(&self) -> StoreResult<Vec<GroupRecord>>;

    /// Returns every proxy definition with its group and last contact time.
    ///
    /// # Errors
    ///
    /// Returns a [`super::StoreError`] when the definitions cannot be read.
    fn fetch_proxies(&self) -> StoreResult<Vec<ProxyRecord>>;
}
