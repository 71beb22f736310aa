//! Schema type model
//!
//! Static description of record types: ordered fields with kinds. Types
//! live in a [`SchemaCatalog`] arena and refer to each other by
//! [`SchemaId`], which is how self-referential and mutually recursive
//! types are expressed.

pub mod builder;
pub mod catalog;
pub mod types;

pub use builder::SchemaBuilder;
pub use catalog::SchemaCatalog;
pub use types::{FieldDescriptor, FieldKind, SchemaId, SchemaType};
