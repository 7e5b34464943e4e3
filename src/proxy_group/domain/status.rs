//! Health status enums for proxies and proxy groups.
//!
//! Both enums have a canonical lowercase name, used in logs and snapshots,
//! and a small integer storage code matching the `state` columns of the
//! `proxy` and `proxy_group` tables.

use super::{ParseGroupStatusError, ParseProxyStatusError, ProxyGroupDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health status of a single proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    /// No verdict has been reached since the manager started.
    #[default]
    Unknown,
    /// The proxy has been silent for a full failover window.
    Offline,
    /// The proxy has been in contact for a full failover window.
    Online,
}

impl ProxyStatus {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Offline => "offline",
            Self::Online => "online",
        }
    }

    /// Returns the storage code written to `proxy.state`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Offline => 1,
            Self::Online => 2,
        }
    }
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<i32> for ProxyStatus {
    type Error = ProxyGroupDomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Offline),
            2 => Ok(Self::Online),
            _ => Err(ProxyGroupDomainError::InvalidProxyStatusCode(code)),
        }
    }
}

impl TryFrom<&str> for ProxyStatus {
    type Error = ParseProxyStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            _ => Err(ParseProxyStatusError(value.to_owned())),
        }
    }
}

/// Health status of a proxy group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Freshly loaded; moves to [`GroupStatus::Recovery`] on first evaluation.
    #[default]
    Unknown,
    /// Too few proxies are online to serve the group.
    Offline,
    /// Waiting for enough proxies to come online.
    Recovery,
    /// Enough proxies are online and fresh.
    Online,
    /// Online, but fewer than the minimum proxies are fresh.
    Decay,
}

impl GroupStatus {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Offline => "offline",
            Self::Recovery => "recovery",
            Self::Online => "online",
            Self::Decay => "decay",
        }
    }

    /// Returns the storage code written to `proxy_group.state`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Offline => 1,
            Self::Recovery => 2,
            Self::Online => 3,
            Self::Decay => 4,
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<i32> for GroupStatus {
    type Error = ProxyGroupDomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Offline),
            2 => Ok(Self::Recovery),
            3 => Ok(Self::Online),
            4 => Ok(Self::Decay),
            _ => Err(ProxyGroupDomainError::InvalidGroupStatusCode(code)),
        }
    }
}

impl TryFrom<&str> for GroupStatus {
    type Error = ParseGroupStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "offline" => Ok(Self::Offline),
            "recovery" => Ok(Self::Recovery),
            "online" => Ok(Self::Online),
            "decay" => Ok(Self::Decay),
            _ => Err(ParseGroupStatusError(value.to_owned())),
        }
    }
}

/// A status transition produced by a health evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange<S> {
    /// Status before the evaluation.
    pub from: S,
    /// Status after the evaluation.
    pub to: S,
}
