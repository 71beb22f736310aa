//! Field kinds and schema type descriptions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a schema type inside its [`super::SchemaCatalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId(pub(crate) u32);

impl SchemaId {
    /// Raw arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema#{}", self.0)
    }
}

/// Kind of a single field
///
/// `Object` embeds a nested record by value. `Ref` instead holds the
/// [`crate::ChunkId`] of another stored record, so a fixed-layout type may
/// point at itself or at a peer. In both cases the target schema only has
/// to be declared, not yet defined, when the field is added.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// UTF-16 code unit, stored as a little-endian u16
    Char,
    /// Length-prefixed UTF-8 string
    Str,
    /// Array with a count fixed by the schema
    FixedArray(Box<FieldKind>, u32),
    /// Array whose count is only known at run time
    List(Box<FieldKind>),
    /// Nested record, never absent
    Object(SchemaId),
    /// Chunk id of a stored record of the given schema, 8 bytes
    Ref(SchemaId),
}

impl FieldKind {
    /// Fixed-count array of `element`
    pub fn fixed_array(element: FieldKind, count: u32) -> Self {
        FieldKind::FixedArray(Box::new(element), count)
    }

    /// Variable-count array of `element`
    pub fn list(element: FieldKind) -> Self {
        FieldKind::List(Box::new(element))
    }

    /// Byte width of primitive kinds, `None` for composite kinds
    pub fn primitive_width(&self) -> Option<u32> {
        match self {
            FieldKind::Bool | FieldKind::Int8 => Some(1),
            FieldKind::Int16 | FieldKind::Char => Some(2),
            FieldKind::Int32 | FieldKind::Float32 => Some(4),
            FieldKind::Int64 | FieldKind::Float64 | FieldKind::Ref(_) => Some(8),
            FieldKind::Str
            | FieldKind::FixedArray(..)
            | FieldKind::List(..)
            | FieldKind::Object(_) => None,
        }
    }

    /// True for kinds with a constant natural width
    pub fn is_primitive(&self) -> bool {
        self.primitive_width().is_some()
    }

    /// Schema this kind embeds by value, looking through fixed arrays
    pub fn embedded_schema(&self) -> Option<SchemaId> {
        match self {
            FieldKind::Object(id) => Some(*id),
            FieldKind::FixedArray(element, _) => element.embedded_schema(),
            _ => None,
        }
    }

    /// Schema named by an `Object` or `Ref` kind, looking through all arrays
    pub fn target_schema(&self) -> Option<SchemaId> {
        match self.innermost() {
            FieldKind::Object(id) | FieldKind::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Innermost element kind of nested arrays
    pub fn innermost(&self) -> &FieldKind {
        match self {
            FieldKind::FixedArray(element, _) | FieldKind::List(element) => element.innermost(),
            other => other,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Bool => f.write_str("bool"),
            FieldKind::Int8 => f.write_str("int8"),
            FieldKind::Int16 => f.write_str("int16"),
            FieldKind::Int32 => f.write_str("int32"),
            FieldKind::Int64 => f.write_str("int64"),
            FieldKind::Float32 => f.write_str("float32"),
            FieldKind::Float64 => f.write_str("float64"),
            FieldKind::Char => f.write_str("char"),
            FieldKind::Str => f.write_str("string"),
            FieldKind::FixedArray(element, count) => write!(f, "{}[{}]", element, count),
            FieldKind::List(element) => write!(f, "{}[]", element),
            FieldKind::Object(id) => write!(f, "{}", id),
            FieldKind::Ref(id) => write!(f, "&{}", id),
        }
    }
}

/// A named field of a schema type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A defined schema type: name plus ordered fields
///
/// Field order fixes both the stream encoding order and the fixed-layout
/// offset order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaType {
    pub(crate) id: SchemaId,
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldDescriptor>,
}

impl SchemaType {
    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Position of a field by name
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
