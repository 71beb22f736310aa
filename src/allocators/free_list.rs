//! Bump cursor with exact-size free lists

use std::collections::BTreeMap;

use super::traits::{Extent, ExtentAllocator};
use crate::error::{ChunkSchemaError, Result};

/// Allocates from a bump cursor and recycles freed extents of equal size
///
/// Sizes are rounded up to the arena alignment, so a freed extent can be
/// reused by any later request that rounds to the same size. Freeing the
/// extent right below the cursor moves the cursor back instead.
#[derive(Debug)]
pub struct FreeListAllocator {
    total_size: usize,
    alignment: usize,
    cursor: usize,
    used: usize,
    free: BTreeMap<usize, Vec<usize>>,
}

impl FreeListAllocator {
    pub fn new(total_size: usize, alignment: usize) -> Result<Self> {
        if total_size == 0 {
            return Err(ChunkSchemaError::invalid_argument(
                "total_size",
                "Allocator size must be greater than 0",
            ));
        }
        if !alignment.is_power_of_two() {
            return Err(ChunkSchemaError::invalid_argument(
                "alignment",
                "Alignment must be a power of 2",
            ));
        }
        Ok(Self {
            total_size,
            alignment,
            cursor: 0,
            used: 0,
            free: BTreeMap::new(),
        })
    }

    /// Align a value up to the given alignment
    fn align_up(value: usize, align: usize) -> Option<usize> {
        value.checked_add(align - 1).map(|v| v & !(align - 1))
    }

    /// Current end of the bump region
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of extents waiting for reuse
    pub fn free_extents(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}

impl ExtentAllocator for FreeListAllocator {
    fn allocate(&mut self, size: usize, align: usize) -> Result<Extent> {
        if size == 0 {
            return Err(ChunkSchemaError::invalid_argument(
                "size",
                "Size must be greater than 0",
            ));
        }
        if !align.is_power_of_two() {
            return Err(ChunkSchemaError::invalid_argument(
                "align",
                "Alignment must be a power of 2",
            ));
        }

        let align = align.max(self.alignment);
        let len = Self::align_up(size, self.alignment)
            .ok_or_else(|| ChunkSchemaError::insufficient_space(size, self.available_size()))?;

        if let Some(offsets) = self.free.get_mut(&len) {
            if let Some(pos) = offsets.iter().position(|offset| offset % align == 0) {
                let offset = offsets.swap_remove(pos);
                if offsets.is_empty() {
                    self.free.remove(&len);
                }
                self.used += len;
                return Ok(Extent { offset, len });
            }
        }

        let offset = Self::align_up(self.cursor, align)
            .filter(|start| start.checked_add(len).map_or(false, |end| end <= self.total_size))
            .ok_or_else(|| {
                ChunkSchemaError::insufficient_space(size, self.total_size - self.cursor)
            })?;
        self.cursor = offset + len;
        self.used += len;
        Ok(Extent { offset, len })
    }

    fn deallocate(&mut self, extent: Extent) -> Result<()> {
        if extent.end() > self.cursor || extent.len > self.used {
            return Err(ChunkSchemaError::invalid_argument(
                "extent",
                format!("{}..{} was not allocated here", extent.offset, extent.end()),
            ));
        }

        self.used -= extent.len;
        if extent.end() == self.cursor {
            self.cursor = extent.offset;
        } else {
            self.free.entry(extent.len).or_default().push(extent.offset);
        }
        Ok(())
    }

    fn total_size(&self) -> usize {
        self.total_size
    }

    fn used_size(&self) -> usize {
        self.used
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.used = 0;
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::ExtentAllocatorExt;

    #[test]
    fn test_bump_then_reuse() {
        let mut allocator = FreeListAllocator::new(1024, 8).unwrap();
        let a = allocator.allocate(5, 1).unwrap();
        let b = allocator.allocate(20, 1).unwrap();
        assert_eq!(a, Extent { offset: 0, len: 8 });
        assert_eq!(b, Extent { offset: 8, len: 24 });
        assert_eq!(allocator.used_size(), 32);

        allocator.deallocate(a).unwrap();
        assert_eq!(allocator.free_extents(), 1);
        let c = allocator.allocate(7, 1).unwrap();
        assert_eq!(c.offset, 0);
        assert_eq!(allocator.free_extents(), 0);
    }

    #[test]
    fn test_top_extent_moves_cursor_back() {
        let mut allocator = FreeListAllocator::new(1024, 8).unwrap();
        allocator.allocate(16, 8).unwrap();
        let top = allocator.allocate(16, 8).unwrap();
        allocator.deallocate(top).unwrap();
        assert_eq!(allocator.cursor(), 16);
        assert_eq!(allocator.free_extents(), 0);
    }

    #[test]
    fn test_insufficient_space() {
        let mut allocator = FreeListAllocator::new(64, 8).unwrap();
        allocator.allocate(60, 8).unwrap();
        assert!(matches!(
            allocator.allocate(8, 8),
            Err(ChunkSchemaError::InsufficientSpace { .. })
        ));
        assert!(allocator.utilization() > 0.9);
        assert!(!allocator.can_allocate(8));
    }

    #[test]
    fn test_invalid_requests() {
        let mut allocator = FreeListAllocator::new(64, 8).unwrap();
        assert!(allocator.allocate(0, 8).is_err());
        assert!(allocator.allocate(8, 3).is_err());
        assert!(allocator.deallocate(Extent { offset: 0, len: 8 }).is_err());
        assert!(FreeListAllocator::new(0, 8).is_err());
    }
}
