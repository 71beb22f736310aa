//! In-process chunk service over a memory-mapped arena

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::{debug, trace};

use crate::allocators::{Extent, ExtentAllocator, FreeListAllocator};
use crate::error::{ChunkSchemaError, Result};
use crate::memory::{BackingArena, StoreConfig};

use super::id::ChunkId;
use super::service::{ChunkService, PinnedRange};

#[derive(Debug)]
struct LocalChunk {
    extent: Extent,
    size: usize,
    pinned: bool,
}

#[derive(Debug)]
struct LocalState {
    allocator: Box<dyn ExtentAllocator>,
    chunks: HashMap<ChunkId, LocalChunk>,
}

impl LocalState {
    fn chunk(&self, id: ChunkId) -> Result<&LocalChunk> {
        self.chunks
            .get(&id)
            .ok_or_else(|| ChunkSchemaError::unknown_handle(id))
    }

    /// Chunk whose bytes may be copied under the lock
    fn unpinned(&self, id: ChunkId) -> Result<&LocalChunk> {
        let chunk = self.chunk(id)?;
        if chunk.pinned {
            return Err(ChunkSchemaError::invalid_argument(
                "id",
                format!("{} is pinned", id),
            ));
        }
        Ok(chunk)
    }
}

/// Single-node [`ChunkService`] keeping every chunk in one arena
///
/// All operations serialise on one lock, which makes each of them atomic.
/// Bytes of a pinned chunk belong to the pin holder, so copies in and out
/// are refused until it is unpinned.
#[derive(Debug)]
pub struct LocalChunkService {
    arena: BackingArena,
    alignment: usize,
    state: Mutex<LocalState>,
}

impl LocalChunkService {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let arena = BackingArena::new(&config)?;
        let allocator = FreeListAllocator::new(arena.capacity(), config.alignment)?;
        Ok(Self {
            arena,
            alignment: config.alignment,
            state: Mutex::new(LocalState {
                allocator: Box::new(allocator),
                chunks: HashMap::new(),
            }),
        })
    }

    /// Anonymous arena of `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::new(StoreConfig::new("chunkschema-local", capacity))
    }

    pub fn arena(&self) -> &BackingArena {
        &self.arena
    }

    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self.lock()?.chunks.len())
    }

    /// Bytes handed out to chunks, alignment padding included
    pub fn used_bytes(&self) -> Result<usize> {
        Ok(self.lock()?.allocator.used_size())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LocalState>> {
        Ok(self.state.lock()?)
    }

    fn check_range(id: ChunkId, chunk: &LocalChunk, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= chunk.size => Ok(()),
            _ => Err(ChunkSchemaError::invalid_argument(
                "offset",
                format!("{}..+{} is outside {} ({} bytes)", offset, len, id, chunk.size),
            )),
        }
    }
}

impl ChunkService for LocalChunkService {
    fn allocate(&self, id: ChunkId, size: usize, zeroed: bool) -> Result<()> {
        let mut state = self.lock()?;
        if state.chunks.contains_key(&id) {
            return Err(ChunkSchemaError::invalid_argument(
                "id",
                format!("{} already has storage", id),
            ));
        }

        let extent = state.allocator.allocate(size, self.alignment)?;
        if zeroed {
            if let Err(e) = self.arena.fill(extent.offset, extent.len, 0) {
                state.allocator.deallocate(extent)?;
                return Err(e);
            }
        }
        state.chunks.insert(
            id,
            LocalChunk {
                extent,
                size,
                pinned: false,
            },
        );
        trace!("allocated {} at {}+{}", id, extent.offset, extent.len);
        Ok(())
    }

    fn release(&self, id: ChunkId) -> Result<()> {
        let mut state = self.lock()?;
        if state.chunk(id)?.pinned {
            return Err(ChunkSchemaError::invalid_argument(
                "id",
                format!("{} is pinned", id),
            ));
        }
        if let Some(chunk) = state.chunks.remove(&id) {
            state.allocator.deallocate(chunk.extent)?;
        }
        debug!("released {}", id);
        Ok(())
    }

    fn pin(&self, id: ChunkId) -> Result<PinnedRange> {
        let mut state = self.lock()?;
        let chunk = state
            .chunks
            .get_mut(&id)
            .ok_or_else(|| ChunkSchemaError::unknown_handle(id))?;
        if chunk.pinned {
            return Err(ChunkSchemaError::invalid_argument(
                "id",
                format!("{} is already pinned", id),
            ));
        }
        let addr = self.arena.ptr_at(chunk.extent.offset)?;
        chunk.pinned = true;
        Ok(PinnedRange {
            addr,
            len: chunk.size,
        })
    }

    fn unpin(&self, id: ChunkId) -> Result<()> {
        let mut state = self.lock()?;
        let chunk = state
            .chunks
            .get_mut(&id)
            .ok_or_else(|| ChunkSchemaError::unknown_handle(id))?;
        if !chunk.pinned {
            return Err(ChunkSchemaError::invalid_argument(
                "id",
                format!("{} is not pinned", id),
            ));
        }
        chunk.pinned = false;
        Ok(())
    }

    fn read(&self, id: ChunkId, offset: usize, buf: &mut [u8]) -> Result<()> {
        let state = self.lock()?;
        let chunk = state.unpinned(id)?;
        Self::check_range(id, chunk, offset, buf.len())?;
        self.arena.read(chunk.extent.offset + offset, buf)
    }

    fn write(&self, id: ChunkId, offset: usize, bytes: &[u8]) -> Result<()> {
        let state = self.lock()?;
        let chunk = state.unpinned(id)?;
        Self::check_range(id, chunk, offset, bytes.len())?;
        self.arena.write(chunk.extent.offset + offset, bytes)
    }

    fn chunk_size(&self, id: ChunkId) -> Result<usize> {
        Ok(self.lock()?.chunk(id)?.size)
    }

    fn contains(&self, id: ChunkId) -> bool {
        self.lock()
            .map(|state| state.chunks.contains_key(&id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_read_write_release() {
        let service = LocalChunkService::with_capacity(4096).unwrap();
        let id = ChunkId::new(0, 1);
        service.allocate(id, 10, true).unwrap();
        assert!(service.contains(id));
        assert_eq!(service.chunk_size(id).unwrap(), 10);

        let mut buf = [0xffu8; 10];
        service.read(id, 0, &mut buf).unwrap();
        assert_eq!(buf, [0; 10]);

        service.write(id, 6, &[1, 2, 3, 4]).unwrap();
        assert!(service.write(id, 7, &[1, 2, 3, 4]).is_err());

        service.release(id).unwrap();
        assert!(!service.contains(id));
        assert_eq!(service.used_bytes().unwrap(), 0);
        assert!(matches!(
            service.release(id),
            Err(ChunkSchemaError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn test_pinned_chunk_cannot_be_released() {
        let service = LocalChunkService::with_capacity(4096).unwrap();
        let id = ChunkId::new(0, 1);
        service.allocate(id, 8, true).unwrap();

        let range = service.pin(id).unwrap();
        assert_eq!(range.len, 8);
        assert!(service.pin(id).is_err());
        assert!(service.release(id).is_err());
        assert!(service.write(id, 0, &[1]).is_err());
        assert!(service.read(id, 0, &mut [0u8; 1]).is_err());

        service.unpin(id).unwrap();
        assert!(service.unpin(id).is_err());
        service.release(id).unwrap();
    }

    #[test]
    fn test_arena_exhaustion() {
        let service = LocalChunkService::with_capacity(64).unwrap();
        service.allocate(ChunkId::new(0, 1), 64, false).unwrap();
        assert!(matches!(
            service.allocate(ChunkId::new(0, 2), 1, false),
            Err(ChunkSchemaError::InsufficientSpace { .. })
        ));
    }
}
