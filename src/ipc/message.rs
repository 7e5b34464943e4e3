//! Message codes and messages understood by the update service.

use super::codec::encode_moves;
use crate::proxy_group::domain::{HostId, ObjectMove, ProxyId};
use bytes::Bytes;
use std::fmt;

/// Known message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    /// Hosts moved between proxy groups.
    HostGroupUpdate,
    /// Proxies moved between proxy groups.
    ProxyGroupUpdate,
    /// Stop the receive loop.
    Stop,
}

impl MessageCode {
    /// Returns the numeric wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::HostGroupUpdate => 1,
            Self::ProxyGroupUpdate => 2,
            Self::Stop => 3,
        }
    }

    /// Maps a numeric wire code, returning `None` for unknown codes.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::HostGroupUpdate),
            2 => Some(Self::ProxyGroupUpdate),
            3 => Some(Self::Stop),
            _ => None,
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostGroupUpdate => "host_pgroup_update",
            Self::ProxyGroupUpdate => "proxy_pgroup_update",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A framed message with a numeric code and opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcMessage {
    code: u32,
    payload: Bytes,
}

impl IpcMessage {
    /// Creates a message with a known code.
    #[must_use]
    pub const fn new(code: MessageCode, payload: Bytes) -> Self {
        Self::from_raw(code.code(), payload)
    }

    /// Creates a message with an arbitrary numeric code.
    #[must_use]
    pub const fn from_raw(code: u32, payload: Bytes) -> Self {
        Self { code, payload }
    }

    /// Creates a stop request.
    #[must_use]
    pub const fn stop() -> Self {
        Self::new(MessageCode::Stop, Bytes::new())
    }

    /// Creates a host relocation notification.
    #[must_use]
    pub fn host_group_update(moves: &[ObjectMove<HostId>]) -> Self {
        let payload = encode_moves(moves.iter().map(|relocation| relocation.map_object(HostId::value)));
        Self::new(MessageCode::HostGroupUpdate, payload)
    }

    /// Creates a proxy relocation notification.
    #[must_use]
    pub fn proxy_group_update(moves: &[ObjectMove<ProxyId>]) -> Self {
        let payload =
            encode_moves(moves.iter().map(|relocation| relocation.map_object(ProxyId::value)));
        Self::new(MessageCode::ProxyGroupUpdate, payload)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn raw_code(&self) -> u32 {
        self.code
    }

    /// Returns the known code, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<MessageCode> {
        MessageCode::from_code(self.code)
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }
}
