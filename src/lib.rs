//! # chunkschema - Dual binary representation for chunk-store records
//!
//! Records of a shared-memory chunk store can be stored in two ways:
//!
//! - **Stream codec**: any object instance, including nested,
//!   variable-length and self-referential types, encoded as a flat byte
//!   sequence and decoded back.
//! - **Fixed layout**: records whose fields are all fixed-width live in a
//!   packed blob and are read and written in place, field by field,
//!   without building an object first.
//!
//! For fixed-width types the two representations are byte-identical.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  SchemaCatalog ──► TypeRegistry ──init──► Runtime │
//! ├──────────────────────────┬───────────────────────┤
//! │  Stream codec            │  Fixed layout          │
//! │  - size calculator       │  - field offsets       │
//! │  - encode / decode       │  - RawAccess targets   │
//! └──────────────────────────┴───────────────────────┘
//!                 │                     │
//!                 ▼                     ▼
//! ┌──────────────────────────────────────────────────┐
//! │  ChunkManager ──► ChunkService (LocalChunkService)│
//! └──────────────────────────────────────────────────┘
//! ```

// Core modules
pub mod codec;
pub mod error;
pub mod layout;
pub mod raw;
pub mod registry;
pub mod schema;
pub mod value;

// Chunk storage
pub mod allocators;
pub mod chunk;
pub mod memory;
pub mod stats;

// Main API re-exports
pub use chunk::{ChunkId, ChunkManager, ChunkService, LocalChunkService, NodeId, PinGuard};
pub use codec::{ByteSink, ByteSource, SizeCalculator, SliceSource, StreamCodec, VecSink};
pub use error::{ChunkSchemaError, Result};
pub use layout::{FieldSlot, FixedLayout, Located};
pub use memory::{BackingArena, BackingType, StoreConfig};
pub use raw::{FixedRecordCodec, HandleAccess, RawAccess, RawAccessExt, RecordAccess};
pub use registry::{
    Bootstrap, InitGate, PinnedRecord, Representation, Runtime, TypeDescriptor, TypeId,
    TypeRegistry,
};
pub use schema::{FieldDescriptor, FieldKind, SchemaBuilder, SchemaCatalog, SchemaId, SchemaType};
pub use stats::{AtomicChunkStats, ChunkStats};
pub use value::{ObjectGraph, ObjectId, Value};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    /// Default size of the local chunk arena (16MB)
    pub const DEFAULT_ARENA_CAPACITY: usize = 16 * 1024 * 1024;

    /// Default start alignment of chunk storage
    pub const DEFAULT_ALIGNMENT: usize = 8;

    /// Bits of a chunk id naming the creating node
    pub const NODE_ID_BITS: u32 = 16;

    /// Bits of a chunk id holding the per-node sequence
    pub const LOCAL_ID_BITS: u32 = 48;
}
