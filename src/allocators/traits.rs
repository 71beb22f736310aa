//! Extent allocator trait definition

use crate::error::Result;

/// A byte range inside an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub offset: usize,
    pub len: usize,
}

impl Extent {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Trait for allocators handing out offsets inside an arena
pub trait ExtentAllocator: Send + Sync + std::fmt::Debug {
    /// Reserve `size` bytes starting at a multiple of `align`
    fn allocate(&mut self, size: usize, align: usize) -> Result<Extent>;

    /// Return a previously allocated extent
    fn deallocate(&mut self, extent: Extent) -> Result<()>;

    /// Get the total size managed by the allocator
    fn total_size(&self) -> usize;

    /// Get the amount of used memory
    fn used_size(&self) -> usize;

    fn available_size(&self) -> usize {
        self.total_size() - self.used_size()
    }

    /// Forget every allocation
    fn reset(&mut self);

    /// Get allocator type name for debugging
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Common allocator queries
pub trait ExtentAllocatorExt: ExtentAllocator {
    /// Get utilization (0.0 to 1.0)
    fn utilization(&self) -> f64 {
        if self.total_size() == 0 {
            return 0.0;
        }
        self.used_size() as f64 / self.total_size() as f64
    }

    fn can_allocate(&self, size: usize) -> bool {
        self.available_size() >= size
    }
}

// Blanket implementation for all extent allocators
impl<T: ExtentAllocator + ?Sized> ExtentAllocatorExt for T {}
