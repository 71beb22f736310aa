//! Fluent construction of schema field lists

use super::types::{FieldDescriptor, FieldKind, SchemaId};

/// Ordered field list waiting to be defined in a catalog
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    pub(crate) fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; declaration order is significant
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind));
        self
    }

    pub fn bool(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Bool)
    }

    pub fn int8(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Int8)
    }

    pub fn int16(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Int16)
    }

    pub fn int32(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Int32)
    }

    pub fn int64(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Int64)
    }

    pub fn float32(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Float32)
    }

    pub fn float64(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Float64)
    }

    pub fn char(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Char)
    }

    pub fn string(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Str)
    }

    pub fn object(self, name: impl Into<String>, schema: SchemaId) -> Self {
        self.field(name, FieldKind::Object(schema))
    }

    /// Chunk id of another stored record
    pub fn reference(self, name: impl Into<String>, schema: SchemaId) -> Self {
        self.field(name, FieldKind::Ref(schema))
    }

    pub fn fixed_array(self, name: impl Into<String>, element: FieldKind, count: u32) -> Self {
        self.field(name, FieldKind::fixed_array(element, count))
    }

    pub fn list(self, name: impl Into<String>, element: FieldKind) -> Self {
        self.field(name, FieldKind::list(element))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
