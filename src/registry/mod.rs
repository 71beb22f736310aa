//! Type registration and one-time bootstrap
//!
//! Types are registered on a [`TypeRegistry`] in a fixed order, receiving
//! consecutive [`TypeId`]s from 0. [`TypeRegistry::init`] consumes the
//! registry together with the injected chunk service and produces the
//! [`Runtime`], the process context every record operation goes through.

pub mod gate;
pub mod runtime;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::error::{ChunkSchemaError, Result};
use crate::layout::FixedLayout;
use crate::schema::{SchemaCatalog, SchemaId};

pub use gate::{Bootstrap, InitGate};
pub use runtime::{PinnedRecord, Runtime};
pub use types::{Representation, TypeDescriptor, TypeId};

/// Registration phase of the type table
#[derive(Debug)]
pub struct TypeRegistry {
    catalog: Arc<SchemaCatalog>,
    descriptors: Vec<TypeDescriptor>,
    by_schema: HashMap<SchemaId, TypeId>,
}

impl TypeRegistry {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            descriptors: Vec::new(),
            by_schema: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn descriptors(&self) -> &[TypeDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Register a type; fixed-width types also get their fixed layout
    pub fn register_type(&mut self, schema: SchemaId) -> Result<TypeId> {
        self.catalog.validate(schema)?;
        let layout = if self.catalog.is_fixed_width(schema)? {
            Some(FixedLayout::compute(&self.catalog, schema)?)
        } else {
            None
        };
        self.push(schema, layout)
    }

    /// Register a type that must map onto a fixed layout
    pub fn register_fixed_type(&mut self, schema: SchemaId) -> Result<TypeId> {
        let layout = FixedLayout::compute(&self.catalog, schema)?;
        self.push(schema, Some(layout))
    }

    fn push(&mut self, schema: SchemaId, layout: Option<Arc<FixedLayout>>) -> Result<TypeId> {
        let name = self.catalog.schema(schema)?.name().to_string();
        if self.by_schema.contains_key(&schema) {
            return Err(ChunkSchemaError::invalid_argument(
                "schema",
                format!("{} is already registered", name),
            ));
        }
        let raw = u16::try_from(self.descriptors.len()).map_err(|_| {
            ChunkSchemaError::invalid_argument("schema", "type id space exhausted")
        })?;

        let type_id = TypeId(raw);
        let representation = if layout.is_some() {
            Representation::Both
        } else {
            Representation::Streamable
        };
        debug!("registered {} as {} ({:?})", name, type_id, representation);

        self.descriptors.push(TypeDescriptor {
            type_id,
            schema,
            name,
            representation,
            layout,
        });
        self.by_schema.insert(schema, type_id);
        Ok(type_id)
    }

    /// Bootstrap the process context; allowed once per process
    pub fn init(self, bootstrap: Bootstrap) -> Result<Runtime> {
        self.init_with_gate(&gate::PROCESS_GATE, bootstrap)
    }

    /// Bootstrap through a caller-owned gate
    pub fn init_with_gate(self, gate: &InitGate, bootstrap: Bootstrap) -> Result<Runtime> {
        gate.enter()?;
        info!(
            "initialised {} types on node {}",
            self.descriptors.len(),
            bootstrap.node_id
        );
        Ok(Runtime::new(
            self.catalog,
            self.descriptors,
            self.by_schema,
            bootstrap,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, SchemaBuilder};

    fn catalog() -> (Arc<SchemaCatalog>, SchemaId, SchemaId) {
        let mut catalog = SchemaCatalog::new();
        let point = catalog
            .register("Point", SchemaBuilder::new().int32("x").int32("y"))
            .unwrap();
        let path = catalog
            .register(
                "Path",
                SchemaBuilder::new().list("points", FieldKind::Object(point)),
            )
            .unwrap();
        (Arc::new(catalog), point, path)
    }

    #[test]
    fn test_ids_consecutive_from_zero() {
        let (catalog, point, path) = catalog();
        let mut registry = TypeRegistry::new(catalog);
        assert_eq!(registry.register_type(point).unwrap(), TypeId(0));
        assert_eq!(registry.register_type(path).unwrap(), TypeId(1));

        let descriptors = registry.descriptors();
        assert_eq!(descriptors[0].representation(), Representation::Both);
        assert_eq!(descriptors[0].fixed_size(), Some(8));
        assert_eq!(descriptors[1].representation(), Representation::Streamable);
        assert!(descriptors[1].layout().is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let (catalog, point, _) = catalog();
        let mut registry = TypeRegistry::new(catalog);
        registry.register_type(point).unwrap();
        assert!(matches!(
            registry.register_type(point),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_fixed_registration_of_variable_type() {
        let (catalog, _, path) = catalog();
        let mut registry = TypeRegistry::new(catalog);
        assert!(matches!(
            registry.register_fixed_type(path),
            Err(ChunkSchemaError::SchemaViolation { .. })
        ));
        assert!(registry.is_empty());
    }
}
