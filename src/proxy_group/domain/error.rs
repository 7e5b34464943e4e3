//! Error types for proxy group domain parsing and validation.

use thiserror::Error;

/// Errors returned while constructing proxy group domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyGroupDomainError {
    /// A persisted proxy status code is outside the known range.
    #[error("unknown proxy status code: {0}")]
    InvalidProxyStatusCode(i32),

    /// A persisted group status code is outside the known range.
    #[error("unknown proxy group status code: {0}")]
    InvalidGroupStatusCode(i32),

    /// A persisted identifier is negative or zero where a reference is required.
    #[error("invalid persisted identifier {value} in column {column}")]
    InvalidIdentifier {
        /// Column holding the identifier.
        column: &'static str,
        /// Raw persisted value.
        value: i64,
    },
}

/// Error returned while parsing proxy statuses from their canonical names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown proxy status: {0}")]
pub struct ParseProxyStatusError(pub String);

/// Error returned while parsing group statuses from their canonical names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown proxy group status: {0}")]
pub struct ParseGroupStatusError(pub String);
