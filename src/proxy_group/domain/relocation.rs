//! Relocation triples describing objects moving between proxy groups.

use super::ProxyGroupId;
use serde::{Deserialize, Serialize};

/// An object moving from one proxy group to another.
///
/// `source` is `None` when the object was not in any group, `destination`
/// is `None` when it leaves all groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMove<I> {
    /// Identifier of the host or proxy being moved.
    pub object_id: I,
    /// Group the object leaves.
    pub source: Option<ProxyGroupId>,
    /// Group the object joins.
    pub destination: Option<ProxyGroupId>,
}

impl ObjectMove<u64> {
    /// Builds a move from raw wire values, where zero means "no group".
    #[must_use]
    pub const fn from_raw(object_id: u64, source: u64, destination: u64) -> Self {
        Self {
            object_id,
            source: ProxyGroupId::from_raw(source),
            destination: ProxyGroupId::from_raw(destination),
        }
    }

    /// Returns the raw wire values.
    #[must_use]
    pub fn to_raw(self) -> [u64; 3] {
        [
            self.object_id,
            self.source.map_or(0, ProxyGroupId::value),
            self.destination.map_or(0, ProxyGroupId::value),
        ]
    }
}

impl<I> ObjectMove<I> {
    /// Re-types the object identifier.
    #[must_use]
    pub fn map_object<J>(self, convert: impl FnOnce(I) -> J) -> ObjectMove<J> {
        ObjectMove {
            object_id: convert(self.object_id),
            source: self.source,
            destination: self.destination,
        }
    }

    /// Returns whether the move changes group membership.
    #[must_use]
    pub fn is_relocation(&self) -> bool {
        self.source != self.destination
    }
}
