//! Capability interface of the chunk service

use std::ptr::NonNull;

use crate::error::Result;

use super::id::ChunkId;

/// Address range of a pinned chunk
#[derive(Debug, Clone, Copy)]
pub struct PinnedRange {
    pub addr: NonNull<u8>,
    pub len: usize,
}

/// Storage operations the chunk manager needs from the (possibly
/// distributed) chunk service
///
/// Each call is atomic on its own; sequences of calls are not.
pub trait ChunkService: Send + Sync + std::fmt::Debug {
    /// Give `id` `size` bytes of storage, zero-filled if `zeroed`
    fn allocate(&self, id: ChunkId, size: usize, zeroed: bool) -> Result<()>;

    /// Drop the storage of `id`
    fn release(&self, id: ChunkId) -> Result<()>;

    /// Make the chunk's bytes addressable until [`unpin`](Self::unpin)
    fn pin(&self, id: ChunkId) -> Result<PinnedRange>;

    fn unpin(&self, id: ChunkId) -> Result<()>;

    /// Copy bytes out; fails while the chunk is pinned
    fn read(&self, id: ChunkId, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Copy bytes in; fails while the chunk is pinned
    fn write(&self, id: ChunkId, offset: usize, bytes: &[u8]) -> Result<()>;

    /// Size in bytes of an allocated chunk
    fn chunk_size(&self, id: ChunkId) -> Result<usize>;

    fn contains(&self, id: ChunkId) -> bool;
}
