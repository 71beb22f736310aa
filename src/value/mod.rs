//! Object instances
//!
//! Instances of schema types live in an [`ObjectGraph`] arena; nested
//! objects are referenced by index instead of being owned recursively.

pub mod graph;
pub mod types;

pub use graph::{ObjectGraph, ObjectId, ObjectNode};
pub use types::Value;

pub(crate) use types::{char_to_unit, unit_to_char};
