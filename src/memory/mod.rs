//! Memory-mapped arena backing the local chunk service

pub mod arena;
pub mod config;

pub use arena::BackingArena;
pub use config::{BackingType, StoreConfig};
