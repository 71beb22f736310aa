//! Chunk identities, the chunk service capability and lifecycle management

pub mod id;
pub mod local;
pub mod manager;
pub mod pin;
pub mod service;

pub use id::{ChunkId, NodeId, LOCAL_ID_MASK};
pub use local::LocalChunkService;
pub use manager::ChunkManager;
pub use pin::PinGuard;
pub use service::{ChunkService, PinnedRange};
