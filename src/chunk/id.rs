//! Chunk identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{LOCAL_ID_BITS, NODE_ID_BITS};

/// Identity of the node that created a chunk
pub type NodeId = u16;

/// Mask of the per-node sequence part of a [`ChunkId`]
pub const LOCAL_ID_MASK: u64 = (1 << LOCAL_ID_BITS) - 1;

/// 64-bit chunk identifier: creating node in the top 16 bits, a per-node
/// sequence number in the low 48
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Sentinel that never names a chunk
    pub const INVALID: ChunkId = ChunkId(u64::MAX);

    /// All-zero id held by unset references; sequences start at 1 so it is
    /// never issued
    pub const NULL: ChunkId = ChunkId(0);

    /// Compose an id; `local` is truncated to 48 bits
    pub const fn new(node: NodeId, local: u64) -> Self {
        Self(((node as u64) << LOCAL_ID_BITS) | (local & LOCAL_ID_MASK))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn node_id(self) -> NodeId {
        (self.0 >> LOCAL_ID_BITS) as NodeId
    }

    pub const fn local_id(self) -> u64 {
        self.0 & LOCAL_ID_MASK
    }

    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }

    /// True for [`NULL`](Self::NULL) and [`INVALID`](Self::INVALID)
    pub const fn is_unset(self) -> bool {
        self.0 == 0 || self.0 == u64::MAX
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk:{:#018x}", self.0)
    }
}

const _: () = assert!(NODE_ID_BITS + LOCAL_ID_BITS == 64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_and_split() {
        let id = ChunkId::new(3, 42);
        assert_eq!(id.node_id(), 3);
        assert_eq!(id.local_id(), 42);
        assert_eq!(id.raw(), (3u64 << 48) | 42);
        assert_eq!(id.to_string(), "chunk:0x000300000000002a");
    }

    #[test]
    fn test_invalid_sentinel() {
        assert!(!ChunkId::INVALID.is_valid());
        assert!(ChunkId::new(u16::MAX, 0).is_valid());
        assert_eq!(ChunkId::new(0, LOCAL_ID_MASK + 5).local_id(), 4);
        assert!(ChunkId::NULL.is_unset());
        assert!(ChunkId::INVALID.is_unset());
        assert!(!ChunkId::new(0, 1).is_unset());
    }
}
