//! Offset allocators carving chunk storage out of an arena

pub mod free_list;
pub mod traits;

pub use free_list::FreeListAllocator;
pub use traits::{Extent, ExtentAllocator, ExtentAllocatorExt};
