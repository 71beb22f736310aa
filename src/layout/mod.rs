//! Fixed-offset layouts for fixed-width record types
//!
//! A layout is the packed, padding-free placement of every field of a
//! fixed-width schema: field `i` starts at the sum of the widths of the
//! fields before it. Nested records carry their own layout, so offsets
//! compose by addition.

mod path;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkSchemaError, Result};
use crate::schema::{FieldKind, SchemaCatalog, SchemaId};

pub use path::Located;

/// Placement of one field inside its record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSlot {
    pub name: String,
    pub kind: FieldKind,
    pub offset: u32,
    pub width: u32,
    /// Layout of the embedded record for object fields and arrays of objects
    #[serde(skip)]
    pub layout: Option<Arc<FixedLayout>>,
}

/// Byte placement of all fields of one fixed-width schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedLayout {
    schema: SchemaId,
    name: String,
    total_size: u32,
    slots: Vec<FieldSlot>,
    by_name: HashMap<String, usize>,
}

impl FixedLayout {
    /// Compute the layout of `id`; variable-width types have none
    pub fn compute(catalog: &SchemaCatalog, id: SchemaId) -> Result<Arc<Self>> {
        catalog.validate(id)?;
        Self::compute_cached(catalog, id, &mut HashMap::new())
    }

    fn compute_cached(
        catalog: &SchemaCatalog,
        id: SchemaId,
        cache: &mut HashMap<SchemaId, Arc<FixedLayout>>,
    ) -> Result<Arc<Self>> {
        if let Some(layout) = cache.get(&id) {
            return Ok(Arc::clone(layout));
        }

        let schema = catalog.schema(id)?;
        let total_size = catalog.static_size(id)?.ok_or_else(|| {
            ChunkSchemaError::schema_violation(schema.name(), "variable-width type has no fixed layout")
        })?;

        let mut slots = Vec::with_capacity(schema.fields().len());
        let mut by_name = HashMap::with_capacity(schema.fields().len());
        let mut offset = 0u32;
        for field in schema.fields() {
            let width = catalog.kind_static_width(&field.kind)?.ok_or_else(|| {
                ChunkSchemaError::schema_violation(
                    schema.name(),
                    format!("field {} is variable-width", field.name),
                )
            })?;
            let layout = match field.kind.embedded_schema() {
                Some(nested) => Some(Self::compute_cached(catalog, nested, cache)?),
                None => None,
            };
            by_name.insert(field.name.clone(), slots.len());
            slots.push(FieldSlot {
                name: field.name.clone(),
                kind: field.kind.clone(),
                offset,
                width,
                layout,
            });
            offset += width;
        }
        debug_assert_eq!(offset, total_size);

        let layout = Arc::new(Self {
            schema: id,
            name: schema.name().to_string(),
            total_size,
            slots,
            by_name,
        });
        cache.insert(id, Arc::clone(&layout));
        Ok(layout)
    }

    pub fn schema(&self) -> SchemaId {
        self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes of one record
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    pub fn fields(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn field(&self, name: &str) -> Option<&FieldSlot> {
        self.by_name.get(name).map(|&index| &self.slots[index])
    }

    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.field(name).map(|slot| slot.offset)
    }

    /// Offset table in declaration order
    pub fn offsets(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.slots.iter().map(|slot| (slot.name.as_str(), slot.offset))
    }
}

/// Element kind and count of a fixed array
pub(crate) fn element_of(kind: &FieldKind) -> Option<(&FieldKind, u32)> {
    match kind {
        FieldKind::FixedArray(element, count) => Some((element.as_ref(), *count)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    #[test]
    fn test_packed_offsets() {
        let mut catalog = SchemaCatalog::new();
        let flagged = catalog
            .register("Flagged", SchemaBuilder::new().bool("b").int32("n"))
            .unwrap();
        let layout = FixedLayout::compute(&catalog, flagged).unwrap();

        assert_eq!(layout.total_size(), 5);
        assert_eq!(layout.offset_of("b"), Some(0));
        assert_eq!(layout.offset_of("n"), Some(1));
        assert_eq!(layout.offset_of("missing"), None);
    }

    #[test]
    fn test_nested_layouts_compose() {
        let mut catalog = SchemaCatalog::new();
        let point = catalog
            .register("Point", SchemaBuilder::new().int32("x").int32("y"))
            .unwrap();
        let segment = catalog
            .register(
                "Segment",
                SchemaBuilder::new()
                    .int16("id")
                    .object("from", point)
                    .object("to", point),
            )
            .unwrap();
        let layout = FixedLayout::compute(&catalog, segment).unwrap();

        assert_eq!(layout.total_size(), 18);
        let to = layout.field("to").unwrap();
        assert_eq!(to.offset, 10);
        assert_eq!(to.layout.as_ref().unwrap().offset_of("y"), Some(4));

        // nested layouts of the same type are shared
        let from = layout.field("from").unwrap();
        assert!(Arc::ptr_eq(from.layout.as_ref().unwrap(), to.layout.as_ref().unwrap()));
    }

    #[test]
    fn test_variable_width_has_no_layout() {
        let mut catalog = SchemaCatalog::new();
        let named = catalog
            .register("Named", SchemaBuilder::new().int8("a").string("name"))
            .unwrap();
        assert!(matches!(
            FixedLayout::compute(&catalog, named),
            Err(ChunkSchemaError::SchemaViolation { .. })
        ));
    }
}
