//! Scoped pinning of chunk storage

use std::ptr::NonNull;

use log::warn;

use crate::error::Result;
use crate::raw::RawAccess;

use super::id::ChunkId;
use super::manager::ChunkManager;
use super::service::PinnedRange;

/// A chunk's storage made directly addressable
///
/// The address is only reachable through this guard. Dropping the guard
/// unpins the chunk; [`unpin`](Self::unpin) does the same and reports
/// failures instead of logging them.
///
/// Accesses outside the pinned range are contract violations and panic.
#[derive(Debug)]
pub struct PinGuard<'a> {
    manager: &'a ChunkManager,
    id: ChunkId,
    addr: NonNull<u8>,
    len: usize,
    released: bool,
}

impl<'a> PinGuard<'a> {
    pub(crate) fn new(manager: &'a ChunkManager, id: ChunkId, range: PinnedRange) -> Self {
        Self {
            manager,
            id,
            addr: range.addr,
            len: range.len,
            released: false,
        }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Size of the pinned chunk in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start address of the pinned storage; valid while the guard lives
    pub fn as_ptr(&self) -> *const u8 {
        self.addr.as_ptr()
    }

    /// Copy the whole chunk out
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        self.copy_out(0, &mut out);
        out
    }

    pub fn unpin(mut self) -> Result<()> {
        self.released = true;
        self.manager.unpin(self.id)
    }

    fn check(&self, offset: usize, len: usize) {
        let in_range = offset.checked_add(len).map_or(false, |end| end <= self.len);
        assert!(
            in_range,
            "access {}..+{} outside pinned {} ({} bytes)",
            offset,
            len,
            self.id,
            self.len
        );
    }

    fn copy_out(&self, offset: usize, buf: &mut [u8]) {
        self.check(offset, buf.len());
        // SAFETY: range checked against the pinned extent, which stays
        // mapped until this guard unpins it
        unsafe {
            std::ptr::copy_nonoverlapping(self.addr.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
    }
}

impl RawAccess for PinGuard<'_> {
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.copy_out(offset, buf);
        Ok(())
    }

    fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check(offset, bytes.len());
        // SAFETY: as in copy_out
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.addr.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.manager.unpin(self.id) {
                warn!("failed to unpin {}: {}", self.id, e);
            }
        }
    }
}
