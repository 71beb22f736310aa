//! Arena of object instances
//!
//! Object nodes are stored flat in an [`ObjectGraph`] and refer to nested
//! objects by [`ObjectId`]. Creating a node default-constructs every
//! nested object it contains by value, so object fields are never absent.
//! Slots of released nodes are recycled by later allocations.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{ChunkSchemaError, Result};
use crate::schema::{FieldKind, SchemaCatalog, SchemaId};

use super::types::{char_to_unit, Value};

/// Index of a node inside its [`ObjectGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// One object instance: its schema and one value per field
#[derive(Debug, Clone)]
pub struct ObjectNode {
    pub(crate) schema: SchemaId,
    pub(crate) fields: Vec<Value>,
}

impl ObjectNode {
    pub fn schema(&self) -> SchemaId {
        self.schema
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

/// Flat container of object instances sharing one schema catalog
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    catalog: Arc<SchemaCatalog>,
    nodes: Vec<Option<ObjectNode>>,
    free: Vec<ObjectId>,
}

impl ObjectGraph {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots ever allocated, live or free
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Create a default instance of `schema`
    pub fn instantiate(&mut self, schema: SchemaId) -> Result<ObjectId> {
        self.catalog.validate(schema)?;
        self.instantiate_validated(schema)
    }

    /// Create a default instance of a schema already known to be valid
    pub(crate) fn instantiate_validated(&mut self, schema: SchemaId) -> Result<ObjectId> {
        let catalog = Arc::clone(&self.catalog);
        let root = self.alloc(schema)?;
        let mut pending = vec![root];

        while let Some(id) = pending.pop() {
            let node_schema = self.node(id)?.schema;
            let fields = catalog.fields(node_schema)?;
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                values.push(self.default_value(&field.kind, &mut pending)?);
            }
            self.node_mut(id)?.fields = values;
        }

        Ok(root)
    }

    fn default_value(&mut self, kind: &FieldKind, pending: &mut Vec<ObjectId>) -> Result<Value> {
        match kind {
            FieldKind::Object(schema) => {
                let id = self.alloc(*schema)?;
                pending.push(id);
                Ok(Value::Object(id))
            }
            FieldKind::FixedArray(element, count) if element.embedded_schema().is_some() => {
                let mut items = Vec::with_capacity(*count as usize);
                for _ in 0..*count {
                    items.push(self.default_value(element, pending)?);
                }
                Ok(Value::Array(items))
            }
            other => Value::default_for(other).ok_or_else(|| {
                ChunkSchemaError::invalid_argument("kind", format!("no default for {}", other))
            }),
        }
    }

    fn alloc(&mut self, schema: SchemaId) -> Result<ObjectId> {
        let node = ObjectNode {
            schema,
            fields: Vec::new(),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            return Ok(id);
        }

        let index = u32::try_from(self.nodes.len())
            .map_err(|_| ChunkSchemaError::invalid_argument("graph", "object graph is full"))?;
        self.nodes.push(Some(node));
        Ok(ObjectId(index))
    }

    /// Free every node reachable from `values`, except those in `keep`
    ///
    /// The released nodes must not be referenced from anywhere else; their
    /// ids are handed out again by later allocations.
    pub(crate) fn release(&mut self, values: Vec<Value>, keep: &HashSet<ObjectId>) -> usize {
        let mut pending = values;
        let mut released = 0;
        while let Some(value) = pending.pop() {
            match value {
                Value::Array(items) => pending.extend(items),
                Value::Object(id) if !keep.contains(&id) => {
                    if let Some(node) = self.nodes.get_mut(id.index()).and_then(Option::take) {
                        pending.extend(node.fields);
                        self.free.push(id);
                        released += 1;
                    }
                }
                _ => {}
            }
        }
        released
    }

    /// Node by id; a dangling or released id is treated like a null reference
    pub fn node(&self, id: ObjectId) -> Result<&ObjectNode> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| ChunkSchemaError::invalid_argument("object", format!("{} does not exist", id)))
    }

    pub(crate) fn node_mut(&mut self, id: ObjectId) -> Result<&mut ObjectNode> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| ChunkSchemaError::invalid_argument("object", format!("{} does not exist", id)))
    }

    pub fn schema_of(&self, id: ObjectId) -> Result<SchemaId> {
        Ok(self.node(id)?.schema)
    }

    fn field_slot(&self, id: ObjectId, field: &str) -> Result<(usize, &FieldKind)> {
        let schema = self.catalog.schema(self.node(id)?.schema)?;
        let index = schema.field_index(field).ok_or_else(|| {
            ChunkSchemaError::invalid_argument(
                "field",
                format!("{} has no field {}", schema.name(), field),
            )
        })?;
        Ok((index, &schema.fields()[index].kind))
    }

    /// Value of a field by name
    pub fn get(&self, id: ObjectId, field: &str) -> Result<&Value> {
        let (index, _) = self.field_slot(id, field)?;
        Ok(&self.node(id)?.fields[index])
    }

    /// Replace a field value after checking it against the field kind
    pub fn set(&mut self, id: ObjectId, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let (index, kind) = self.field_slot(id, field)?;
        self.check_value(kind, &value)?;
        self.node_mut(id)?.fields[index] = value;
        Ok(())
    }

    /// Nested object held by an object field
    pub fn child(&self, id: ObjectId, field: &str) -> Result<ObjectId> {
        match self.get(id, field)? {
            Value::Object(child) => Ok(*child),
            other => Err(ChunkSchemaError::invalid_argument(
                field,
                format!("expected object, found {}", other.kind_name()),
            )),
        }
    }

    /// Append an element to a list field
    pub fn push(&mut self, id: ObjectId, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let (index, kind) = self.field_slot(id, field)?;
        let element = match kind {
            FieldKind::List(element) => element.as_ref(),
            other => {
                return Err(ChunkSchemaError::invalid_argument(
                    field,
                    format!("push needs a list field, found {}", other),
                ))
            }
        };
        self.check_value(element, &value)?;
        match &mut self.node_mut(id)?.fields[index] {
            Value::Array(items) => items.push(value),
            other => {
                return Err(ChunkSchemaError::invalid_argument(
                    field,
                    format!("list holds {}", other.kind_name()),
                ))
            }
        }
        Ok(())
    }

    /// Append a default-constructed object to a list-of-objects field
    pub fn push_new(&mut self, id: ObjectId, field: &str) -> Result<ObjectId> {
        let (_, kind) = self.field_slot(id, field)?;
        let schema = match kind {
            FieldKind::List(element) => match element.as_ref() {
                FieldKind::Object(schema) => *schema,
                other => {
                    return Err(ChunkSchemaError::invalid_argument(
                        field,
                        format!("list elements are {}", other),
                    ))
                }
            },
            other => {
                return Err(ChunkSchemaError::invalid_argument(
                    field,
                    format!("push needs a list field, found {}", other),
                ))
            }
        };
        let child = self.instantiate_validated(schema)?;
        self.push(id, field, Value::Object(child))?;
        Ok(child)
    }

    /// Check a value against a kind; object references must exist and
    /// point at a node of the expected schema
    pub(crate) fn check_value(&self, kind: &FieldKind, value: &Value) -> Result<()> {
        match (kind, value) {
            (FieldKind::Str, Value::Str(_)) => Ok(()),
            (FieldKind::Char, Value::Char(c)) => char_to_unit(*c).map(|_| ()),
            (FieldKind::FixedArray(element, count), Value::Array(items)) => {
                if items.len() != *count as usize {
                    return Err(ChunkSchemaError::invalid_argument(
                        "array",
                        format!("expected {} elements, found {}", count, items.len()),
                    ));
                }
                items.iter().try_for_each(|item| self.check_value(element, item))
            }
            (FieldKind::List(element), Value::Array(items)) => {
                items.iter().try_for_each(|item| self.check_value(element, item))
            }
            (FieldKind::Object(schema), Value::Object(id)) => {
                let actual = self.node(*id)?.schema;
                if actual != *schema {
                    return Err(ChunkSchemaError::invalid_argument(
                        "object",
                        format!("{} is a {}, expected {}", id, actual, schema),
                    ));
                }
                Ok(())
            }
            (kind, value) if value.matches_primitive(kind) => Ok(()),
            (kind, value) => Err(ChunkSchemaError::invalid_argument(
                "value",
                format!("{} does not fit a {} field", value.kind_name(), kind),
            )),
        }
    }

    /// Deep comparison of two instances, floats compared bit for bit
    pub fn structurally_equal(&self, a: ObjectId, other: &ObjectGraph, b: ObjectId) -> bool {
        let mut pending = vec![(a, b)];
        let mut seen = HashSet::new();

        while let Some((x, y)) = pending.pop() {
            if !seen.insert((x, y)) {
                continue;
            }
            let (Ok(left), Ok(right)) = (self.node(x), other.node(y)) else {
                return false;
            };
            if left.schema != right.schema || left.fields.len() != right.fields.len() {
                return false;
            }
            for (lv, rv) in left.fields.iter().zip(&right.fields) {
                if !values_equal(lv, rv, &mut pending) {
                    return false;
                }
            }
        }
        true
    }
}

fn values_equal(left: &Value, right: &Value, pending: &mut Vec<(ObjectId, ObjectId)>) -> bool {
    match (left, right) {
        (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
        (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y, pending))
        }
        (Value::Object(a), Value::Object(b)) => {
            pending.push((*a, *b));
            true
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    fn catalog() -> (Arc<SchemaCatalog>, SchemaId, SchemaId) {
        let mut catalog = SchemaCatalog::new();
        let point = catalog
            .register("Point", SchemaBuilder::new().int32("x").int32("y"))
            .unwrap();
        let shape = catalog
            .register(
                "Shape",
                SchemaBuilder::new()
                    .string("name")
                    .object("origin", point)
                    .fixed_array("corners", FieldKind::Object(point), 2)
                    .list("extra", FieldKind::Object(point)),
            )
            .unwrap();
        (Arc::new(catalog), point, shape)
    }

    #[test]
    fn test_instantiate_builds_nested_defaults() {
        let (catalog, point, shape) = catalog();
        let mut graph = ObjectGraph::new(catalog);
        let root = graph.instantiate(shape).unwrap();

        // root + origin + two corners
        assert_eq!(graph.len(), 4);
        let origin = graph.child(root, "origin").unwrap();
        assert_eq!(graph.schema_of(origin).unwrap(), point);
        assert_eq!(graph.get(origin, "x").unwrap(), &Value::Int32(0));

        let corners = graph.get(root, "corners").unwrap().as_array().unwrap();
        assert_eq!(corners.len(), 2);
        assert_eq!(graph.get(root, "extra").unwrap(), &Value::Array(Vec::new()));
    }

    #[test]
    fn test_set_type_checks() {
        let (catalog, _, shape) = catalog();
        let mut graph = ObjectGraph::new(catalog);
        let root = graph.instantiate(shape).unwrap();

        graph.set(root, "name", "triangle").unwrap();
        assert_eq!(graph.get(root, "name").unwrap().as_str(), Some("triangle"));

        assert!(matches!(
            graph.set(root, "name", 5i32),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
        assert!(matches!(
            graph.set(root, "missing", 5i32),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_dangling_object_rejected() {
        let (catalog, _, shape) = catalog();
        let mut graph = ObjectGraph::new(catalog);
        let root = graph.instantiate(shape).unwrap();

        let result = graph.set(root, "origin", Value::Object(ObjectId(999)));
        assert!(matches!(result, Err(ChunkSchemaError::InvalidArgument { .. })));
    }

    #[test]
    fn test_push_new_appends_default_element() {
        let (catalog, _, shape) = catalog();
        let mut graph = ObjectGraph::new(catalog);
        let root = graph.instantiate(shape).unwrap();

        let extra = graph.push_new(root, "extra").unwrap();
        graph.set(extra, "y", -3i32).unwrap();

        let items = graph.get(root, "extra").unwrap().as_array().unwrap();
        assert_eq!(items, &[Value::Object(extra)]);
    }

    #[test]
    fn test_released_slots_are_recycled() {
        let (catalog, point, shape) = catalog();
        let mut graph = ObjectGraph::new(catalog);
        let root = graph.instantiate(shape).unwrap();
        let extra = graph.push_new(root, "extra").unwrap();
        assert_eq!(graph.len(), 5);

        let list = graph.get(root, "extra").unwrap().clone();
        graph.set(root, "extra", Value::Array(Vec::new())).unwrap();
        assert_eq!(graph.release(vec![list], &HashSet::new()), 1);
        assert_eq!(graph.len(), 4);
        assert!(graph.node(extra).is_err());

        let again = graph.instantiate(point).unwrap();
        assert_eq!(again, extra);
        assert_eq!(graph.capacity(), 5);
    }

    #[test]
    fn test_supplementary_char_rejected() {
        let mut catalog = SchemaCatalog::new();
        let glyph = catalog
            .register("Glyph", SchemaBuilder::new().char("c"))
            .unwrap();
        let mut graph = ObjectGraph::new(Arc::new(catalog));
        let node = graph.instantiate(glyph).unwrap();

        graph.set(node, "c", 'ß').unwrap();
        assert!(matches!(
            graph.set(node, "c", '🦀'),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
        assert_eq!(graph.get(node, "c").unwrap(), &Value::Char('ß'));
    }

    #[test]
    fn test_structural_equality() {
        let (catalog, _, shape) = catalog();
        let mut left = ObjectGraph::new(Arc::clone(&catalog));
        let mut right = ObjectGraph::new(catalog);
        let a = left.instantiate(shape).unwrap();
        let b = right.instantiate(shape).unwrap();
        assert!(left.structurally_equal(a, &right, b));

        let origin = right.child(b, "origin").unwrap();
        right.set(origin, "x", 1i32).unwrap();
        assert!(!left.structurally_equal(a, &right, b));
    }
}
