//! Identifier types for proxy groups, proxies, hosts, and host mappings.
//!
//! All identifiers are externally assigned 64-bit database keys. A raw value
//! of zero never names a real object; wire and storage formats use it to mean
//! "none", so conversions from raw values go through [`ProxyGroupId::from_raw`]
//! and friends, which map zero to `None`.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! database_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates an identifier from a non-zero raw value.
            ///
            /// Returns `None` for zero, which storage and wire formats use to
            /// encode an absent reference.
            #[must_use]
            pub const fn from_raw(value: u64) -> Option<Self> {
                if value == 0 { None } else { Some(Self(value)) }
            }

            /// Creates an identifier without checking for the zero sentinel.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

database_id!(
    /// Identifier of a proxy group (`proxy_group.proxy_groupid`).
    ProxyGroupId
);

database_id!(
    /// Identifier of a proxy (`proxy.proxyid`).
    ProxyId
);

database_id!(
    /// Identifier of a monitored host (`hosts.hostid`).
    HostId
);

database_id!(
    /// Storage-level row identifier of a host mapping (`host_proxy.hostproxyid`).
    HostProxyId
);

/// Monotonic revision stamped on host-proxy mappings.
///
/// Unlike the identifiers above, zero is a valid revision: it is the
/// watermark of a store that has never persisted a mapping.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MapRevision(u64);

impl MapRevision {
    /// The revision of an empty mapping table.
    pub const ZERO: Self = Self(0);

    /// Creates a revision from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw revision value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the next revision.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the preceding revision, stopping at zero.
    #[must_use]
    pub const fn previous(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for MapRevision {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
