//! Transport errors.

use super::CodecError;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by message endpoints and senders.
#[derive(Debug, Clone, Error)]
pub enum IpcError {
    /// The endpoint could not be bound to its address.
    #[error("cannot bind message endpoint {address}: {source}")]
    Bind {
        /// Address that could not be bound.
        address: String,
        /// Underlying error.
        source: Arc<std::io::Error>,
    },

    /// The peer or every sender has gone away.
    #[error("message endpoint disconnected")]
    Disconnected,

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Any other transport failure.
    #[error("message transport error: {0}")]
    Io(Arc<std::io::Error>),
}

impl IpcError {
    /// Wraps a transport error.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }

    /// Builds a bind error for `address`.
    #[must_use]
    pub fn bind(address: impl Into<String>, err: std::io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source: Arc::new(err),
        }
    }
}
