//! Chunk lifecycle management

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, trace, warn};

use crate::error::{ChunkSchemaError, Result};
use crate::stats::{AtomicChunkStats, ChunkStats};

use super::id::{ChunkId, NodeId, LOCAL_ID_MASK};
use super::pin::PinGuard;
use super::service::ChunkService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Id issued, no storage yet
    Reserved,
    Created { size: usize },
    Pinned { size: usize },
}

/// Issues chunk ids for one node and tracks each chunk's lifecycle
///
/// Reserved ids have no storage; created chunks have storage. At most one
/// pin is held on a chunk at a time. While pinned, a chunk is reachable
/// only through its [`PinGuard`]: it cannot be removed, and handle reads
/// and writes are refused.
#[derive(Debug)]
pub struct ChunkManager {
    node_id: NodeId,
    service: Arc<dyn ChunkService>,
    next_local: AtomicU64,
    chunks: RwLock<HashMap<ChunkId, ChunkState>>,
    pending: Mutex<VecDeque<ChunkId>>,
    stats: AtomicChunkStats,
}

impl ChunkManager {
    pub fn new(node_id: NodeId, service: Arc<dyn ChunkService>) -> Self {
        Self {
            node_id,
            service,
            next_local: AtomicU64::new(1),
            chunks: RwLock::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            stats: AtomicChunkStats::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn service(&self) -> &Arc<dyn ChunkService> {
        &self.service
    }

    fn next_id(&self) -> Result<ChunkId> {
        let local = self.next_local.fetch_add(1, Ordering::Relaxed);
        if local > LOCAL_ID_MASK {
            return Err(ChunkSchemaError::invalid_argument(
                "sequence",
                format!("node {} has exhausted its chunk ids", self.node_id),
            ));
        }
        Ok(ChunkId::new(self.node_id, local))
    }

    fn check_size(size: usize) -> Result<()> {
        if size == 0 {
            return Err(ChunkSchemaError::invalid_argument(
                "size",
                "Chunk size must be greater than 0",
            ));
        }
        Ok(())
    }

    fn allocate(&self, id: ChunkId, size: usize, zeroed: bool, reserved: bool) -> Result<()> {
        let mut chunks = self.chunks.write()?;
        if let Err(e) = self.service.allocate(id, size, zeroed) {
            self.stats.record_create_failure();
            return Err(e);
        }
        chunks.insert(id, ChunkState::Created { size });
        self.stats.record_create(reserved);
        trace!("created {} ({} bytes)", id, size);
        Ok(())
    }

    /// New zero-filled chunk of `size` bytes
    pub fn create(&self, size: usize) -> Result<ChunkId> {
        Self::check_size(size)?;
        let id = self.next_id()?;
        self.allocate(id, size, true, false)?;
        Ok(id)
    }

    /// `count` new zero-filled chunks of `size` bytes each
    ///
    /// Chunks created before a failure are removed again.
    pub fn create_batch(&self, size: usize, count: usize) -> Result<Vec<ChunkId>> {
        Self::check_size(size)?;
        if count == 0 {
            return Err(ChunkSchemaError::invalid_argument(
                "count",
                "Batch count must be greater than 0",
            ));
        }

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            match self.create(size) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids {
                        if let Err(undo) = self.remove(id) {
                            warn!("failed to roll back {}: {}", id, undo);
                        }
                    }
                    return Err(e);
                }
            }
        }
        debug!("created {} chunks of {} bytes on node {}", count, size, self.node_id);
        Ok(ids)
    }

    /// Issue `count` ids without storage
    pub fn reserve(&self, count: usize) -> Result<Vec<ChunkId>> {
        if count == 0 {
            return Err(ChunkSchemaError::invalid_argument(
                "count",
                "Reservation count must be greater than 0",
            ));
        }

        let ids = (0..count).map(|_| self.next_id()).collect::<Result<Vec<_>>>()?;
        {
            let mut chunks = self.chunks.write()?;
            for id in &ids {
                chunks.insert(*id, ChunkState::Reserved);
            }
        }
        self.pending.lock()?.extend(ids.iter().copied());
        self.stats.record_reserve(ids.len() as u64);
        debug!("reserved {} chunk ids on node {}", count, self.node_id);
        Ok(ids)
    }

    /// Chunk of `size` bytes on the oldest pending reserved id, or a fresh id
    ///
    /// Storage is not zero-filled; the caller is expected to overwrite it.
    pub fn create_reserved(&self, size: usize) -> Result<ChunkId> {
        Self::check_size(size)?;
        let reserved = {
            let chunks = self.chunks.read()?;
            let mut pending = self.pending.lock()?;
            let mut found = None;
            while let Some(id) = pending.pop_front() {
                if chunks.get(&id) == Some(&ChunkState::Reserved) {
                    found = Some(id);
                    break;
                }
            }
            found
        };

        match reserved {
            Some(id) => {
                if let Err(e) = self.allocate(id, size, false, true) {
                    self.pending.lock()?.push_front(id);
                    return Err(e);
                }
                Ok(id)
            }
            None => {
                let id = self.next_id()?;
                self.allocate(id, size, false, false)?;
                Ok(id)
            }
        }
    }

    /// Give storage to a specific id previously returned by [`reserve`](Self::reserve)
    pub fn create_reserved_at(&self, id: ChunkId, size: usize) -> Result<()> {
        Self::check_size(size)?;
        match self.chunks.read()?.get(&id) {
            Some(ChunkState::Reserved) => {}
            Some(_) => {
                return Err(ChunkSchemaError::invalid_argument(
                    "id",
                    format!("{} already has storage", id),
                ))
            }
            None => return Err(ChunkSchemaError::unknown_handle(id)),
        }

        self.pending.lock()?.retain(|pending| *pending != id);
        self.allocate(id, size, false, true)
    }

    /// Remove a chunk (or drop a reservation)
    pub fn remove(&self, id: ChunkId) -> Result<()> {
        let mut chunks = self.chunks.write()?;
        self.remove_locked(&mut chunks, id)
    }

    /// Remove several chunks; nothing is removed unless every id can be
    pub fn remove_batch(&self, ids: &[ChunkId]) -> Result<()> {
        let mut chunks = self.chunks.write()?;
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                return Err(ChunkSchemaError::invalid_argument(
                    "ids",
                    format!("{} is listed twice", id),
                ));
            }
            match chunks.get(id) {
                None => return Err(ChunkSchemaError::unknown_handle(id)),
                Some(ChunkState::Pinned { .. }) => return Err(pinned_error(*id)),
                Some(_) => {}
            }
        }

        for id in ids {
            self.remove_locked(&mut chunks, *id)?;
        }
        debug!("removed {} chunks on node {}", ids.len(), self.node_id);
        Ok(())
    }

    fn remove_locked(&self, chunks: &mut HashMap<ChunkId, ChunkState>, id: ChunkId) -> Result<()> {
        match chunks.get(&id).copied() {
            None => Err(ChunkSchemaError::unknown_handle(id)),
            Some(ChunkState::Pinned { .. }) => Err(pinned_error(id)),
            Some(ChunkState::Reserved) => {
                chunks.remove(&id);
                self.pending.lock()?.retain(|pending| *pending != id);
                trace!("dropped reservation {}", id);
                Ok(())
            }
            Some(ChunkState::Created { .. }) => {
                self.service.release(id)?;
                chunks.remove(&id);
                self.stats.record_remove();
                trace!("removed {}", id);
                Ok(())
            }
        }
    }

    /// Pin a chunk for direct addressing; released when the guard goes away
    pub fn pin(&self, id: ChunkId) -> Result<PinGuard<'_>> {
        let mut chunks = self.chunks.write()?;
        let size = match chunks.get(&id).copied() {
            None => return Err(ChunkSchemaError::unknown_handle(id)),
            Some(ChunkState::Reserved) => {
                return Err(ChunkSchemaError::invalid_argument(
                    "id",
                    format!("{} has no storage", id),
                ))
            }
            Some(ChunkState::Pinned { .. }) => {
                return Err(ChunkSchemaError::invalid_argument(
                    "id",
                    format!("{} is already pinned", id),
                ))
            }
            Some(ChunkState::Created { size }) => size,
        };

        let range = self.service.pin(id)?;
        chunks.insert(id, ChunkState::Pinned { size });
        self.stats.record_pin();
        Ok(PinGuard::new(self, id, range))
    }

    /// Pin several chunks; on failure the pins already taken are released
    pub fn pin_batch(&self, ids: &[ChunkId]) -> Result<Vec<PinGuard<'_>>> {
        ids.iter().map(|id| self.pin(*id)).collect()
    }

    pub(crate) fn unpin(&self, id: ChunkId) -> Result<()> {
        let mut chunks = self.chunks.write()?;
        match chunks.get(&id).copied() {
            Some(ChunkState::Pinned { size }) => {
                self.service.unpin(id)?;
                chunks.insert(id, ChunkState::Created { size });
                Ok(())
            }
            Some(_) => Err(ChunkSchemaError::invalid_argument(
                "id",
                format!("{} is not pinned", id),
            )),
            None => Err(ChunkSchemaError::unknown_handle(id)),
        }
    }

    /// True if `id` names a chunk with storage
    pub fn exists(&self, id: ChunkId) -> bool {
        self.chunks
            .read()
            .map(|chunks| {
                matches!(
                    chunks.get(&id),
                    Some(ChunkState::Created { .. } | ChunkState::Pinned { .. })
                )
            })
            .unwrap_or(false)
    }

    pub fn size_of(&self, id: ChunkId) -> Result<usize> {
        match self.chunks.read()?.get(&id) {
            Some(ChunkState::Created { size } | ChunkState::Pinned { size }) => Ok(*size),
            _ => Err(ChunkSchemaError::unknown_handle(id)),
        }
    }

    /// Ids of all chunks with storage, ascending
    pub fn local_chunk_ids(&self) -> Result<Vec<ChunkId>> {
        let chunks = self.chunks.read()?;
        let mut ids: Vec<ChunkId> = chunks
            .iter()
            .filter(|(_, state)| !matches!(state, ChunkState::Reserved))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Copy bytes out of a chunk through the service; refused while pinned
    pub fn read(&self, id: ChunkId, offset: usize, buf: &mut [u8]) -> Result<()> {
        let chunks = self.chunks.read()?;
        match chunks.get(&id) {
            Some(ChunkState::Created { .. }) => {
                self.service.read(id, offset, buf)?;
                self.stats.record_read(buf.len());
                Ok(())
            }
            Some(ChunkState::Pinned { .. }) => Err(pinned_error(id)),
            _ => Err(ChunkSchemaError::unknown_handle(id)),
        }
    }

    /// Copy bytes into a chunk through the service; refused while pinned
    pub fn write(&self, id: ChunkId, offset: usize, bytes: &[u8]) -> Result<()> {
        let chunks = self.chunks.read()?;
        match chunks.get(&id) {
            Some(ChunkState::Created { .. }) => {
                self.service.write(id, offset, bytes)?;
                self.stats.record_write(bytes.len());
                Ok(())
            }
            Some(ChunkState::Pinned { .. }) => Err(pinned_error(id)),
            _ => Err(ChunkSchemaError::unknown_handle(id)),
        }
    }

    pub fn stats(&self) -> ChunkStats {
        self.stats.snapshot()
    }
}

fn pinned_error(id: ChunkId) -> ChunkSchemaError {
    ChunkSchemaError::invalid_argument("id", format!("{} is pinned", id))
}
