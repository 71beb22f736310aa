//! Exact encoded size of object instances

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ChunkSchemaError, Result};
use crate::schema::{SchemaCatalog, SchemaId};
use crate::value::{ObjectGraph, ObjectId};

use super::walk::Walk;

/// Computes `encode(instance).len()` without encoding
///
/// Sizes of fixed-width schemas are computed once, when the calculator is
/// built, and answered from the cache afterwards.
#[derive(Debug, Clone)]
pub struct SizeCalculator {
    catalog: Arc<SchemaCatalog>,
    fixed: HashMap<SchemaId, u32>,
}

impl SizeCalculator {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        let fixed = catalog
            .defined_ids()
            .filter_map(|id| match catalog.static_size(id) {
                Ok(Some(size)) => Some((id, size)),
                _ => None,
            })
            .collect();
        Self { catalog, fixed }
    }

    /// Cached size of a fixed-width schema
    pub fn fixed_size(&self, schema: SchemaId) -> Option<u32> {
        self.fixed.get(&schema).copied()
    }

    /// Encoded byte length of the instance rooted at `root`
    ///
    /// The instance must not change between this call and the encode it
    /// sizes; holding `&ObjectGraph` across both calls guarantees that.
    pub fn size_of(&self, graph: &ObjectGraph, root: ObjectId) -> Result<u32> {
        if !Arc::ptr_eq(graph.catalog(), &self.catalog) {
            return Err(ChunkSchemaError::invalid_argument(
                "graph",
                "object graph uses a different schema catalog",
            ));
        }

        let schema = graph.schema_of(root)?;
        if let Some(size) = self.fixed_size(schema) {
            return Ok(size);
        }

        let mut total = 0u64;
        for token in Walk::new(graph, root)? {
            total += token?.encoded_len();
        }
        u32::try_from(total).map_err(|_| {
            ChunkSchemaError::invalid_argument("instance", format!("encoded size {} exceeds u32", total))
        })
    }
}
