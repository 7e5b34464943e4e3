//! Persistence port for proxy group state and host mappings.

use crate::proxy_group::domain::{
    FlushBatch, FlushOutcome, HostGroupRecord, HostProxyMapping, MapRevision,
};
use std::sync::Arc;
use thiserror::Error;

/// Result type for proxy group store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage used by the manager.
///
/// Implementations are called from the manager thread only and never while
/// the cache lock is held.
pub trait ProxyGroupStore: Send + Sync {
    /// Loads the durable mapping revision watermark.
    ///
    /// Returns [`MapRevision::ZERO`] when no watermark was ever stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store cannot be reached.
    fn load_hostmap_revision(&self) -> StoreResult<MapRevision>;

    /// Loads every host configured into a proxy group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store cannot be reached.
    fn load_host_groups(&self) -> StoreResult<Vec<HostGroupRecord>>;

    /// Loads every persisted host mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPersistedData`] for rows that cannot be
    /// decoded.
    fn load_mappings(&self) -> StoreResult<Vec<HostProxyMapping>>;

    /// Persists one drained batch atomically.
    ///
    /// New mappings whose host or proxy no longer exists are skipped rather
    /// than failing the batch, and a host keeps at most one stored mapping:
    /// an existing row wins and is reported as conflicting. The revision
    /// watermark is written only when a mapping row changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the batch should be retried
    /// and other variants when it cannot be persisted.
    fn flush(&self, batch: &FlushBatch) -> StoreResult<FlushOutcome>;
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store cannot be reached; the operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),

    /// A persisted row cannot be mapped to domain values.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(String),

    /// Any other persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a connectivity error.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Builds an invalid-data error.
    pub fn invalid_persisted_data(message: impl Into<String>) -> Self {
        Self::InvalidPersistedData(message.into())
    }

    /// Returns whether the failed operation may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
