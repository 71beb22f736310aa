//! Arena of schema types addressed by [`SchemaId`]

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::error::{ChunkSchemaError, Result};

use super::builder::SchemaBuilder;
use super::types::{FieldDescriptor, FieldKind, SchemaId, SchemaType};

/// Encoded width bounds of a schema or field kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Width {
    /// Smallest possible encoding
    min: u64,
    /// Every encoding is exactly `min` bytes
    fixed: bool,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    definition: Option<SchemaType>,
    /// Filled on first successful width computation; definitions never change
    width: OnceLock<Width>,
}

/// All schema types known to a process
///
/// Types are declared first and defined afterwards so that a type can
/// refer to itself or to a peer that is defined later. A catalog is
/// built once at startup and then shared read-only (usually behind an
/// `Arc`).
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    entries: Vec<CatalogEntry>,
    by_name: HashMap<String, SchemaId>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a named type without defining its fields
    pub fn declare(&mut self, name: impl Into<String>) -> Result<SchemaId> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChunkSchemaError::invalid_argument(
                "name",
                "Schema name cannot be empty",
            ));
        }
        if self.by_name.contains_key(&name) {
            return Err(ChunkSchemaError::invalid_argument(
                "name",
                format!("Schema {} already declared", name),
            ));
        }

        let index = u32::try_from(self.entries.len()).map_err(|_| {
            ChunkSchemaError::invalid_argument("name", "Schema catalog is full")
        })?;
        let id = SchemaId(index);
        self.entries.push(CatalogEntry {
            name: name.clone(),
            definition: None,
            width: OnceLock::new(),
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Attach the field list to a declared type; types are immutable afterwards
    ///
    /// A type needs at least one field and fixed arrays at least one
    /// element, so every encoding of every kind occupies at least one byte.
    pub fn define(&mut self, id: SchemaId, builder: SchemaBuilder) -> Result<()> {
        let declared = self.entries.len();
        let entry = self
            .entries
            .get(id.index())
            .ok_or_else(|| ChunkSchemaError::unknown_handle(id))?;

        if entry.definition.is_some() {
            return Err(ChunkSchemaError::invalid_argument(
                "schema",
                format!("Schema {} is already defined", entry.name),
            ));
        }

        if builder.fields.is_empty() {
            return Err(ChunkSchemaError::invalid_argument(
                "schema",
                format!("Schema {} has no fields", entry.name),
            ));
        }

        let mut names = HashSet::new();
        for field in &builder.fields {
            if field.name.is_empty() {
                return Err(ChunkSchemaError::invalid_argument(
                    "field",
                    format!("Schema {} has a field without a name", entry.name),
                ));
            }
            if !names.insert(field.name.as_str()) {
                return Err(ChunkSchemaError::invalid_argument(
                    "field",
                    format!("Schema {} declares field {} twice", entry.name, field.name),
                ));
            }
            if has_empty_array(&field.kind) {
                return Err(ChunkSchemaError::invalid_argument(
                    "field",
                    format!("Field {}.{} is an array of zero elements", entry.name, field.name),
                ));
            }
            if let Some(target) = field.kind.target_schema() {
                if target.index() >= declared {
                    return Err(ChunkSchemaError::unknown_handle(target));
                }
            }
        }

        let name = entry.name.clone();
        self.entries[id.index()].definition = Some(SchemaType {
            id,
            name,
            fields: builder.fields,
        });
        Ok(())
    }

    /// Declare and define in one step
    pub fn register(&mut self, name: impl Into<String>, builder: SchemaBuilder) -> Result<SchemaId> {
        let id = self.declare(name)?;
        self.define(id, builder)?;
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<SchemaId> {
        self.by_name.get(name).copied()
    }

    /// Defined schema type; unknown or undefined ids are programmer errors
    pub fn schema(&self, id: SchemaId) -> Result<&SchemaType> {
        self.entries
            .get(id.index())
            .and_then(|entry| entry.definition.as_ref())
            .ok_or_else(|| ChunkSchemaError::unknown_handle(id))
    }

    pub fn fields(&self, id: SchemaId) -> Result<&[FieldDescriptor]> {
        Ok(self.schema(id)?.fields())
    }

    /// Name of a declared type (defined or not)
    pub fn name_of(&self, id: SchemaId) -> Option<&str> {
        self.entries.get(id.index()).map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all defined types, in declaration order
    pub fn defined_ids(&self) -> impl Iterator<Item = SchemaId> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.definition.as_ref().map(|d| d.id))
    }

    /// True iff no field, recursively, has a content-dependent size
    pub fn is_fixed_width(&self, id: SchemaId) -> Result<bool> {
        Ok(self.schema_width(id, &mut Vec::new())?.fixed)
    }

    pub fn is_kind_fixed_width(&self, kind: &FieldKind) -> Result<bool> {
        Ok(self.kind_width(kind, &mut Vec::new())?.fixed)
    }

    /// Constant encoded size of a fixed-width type, `None` for variable-width types
    pub fn static_size(&self, id: SchemaId) -> Result<Option<u32>> {
        let width = self.schema_width(id, &mut Vec::new())?;
        narrow(width, || self.name_of(id).unwrap_or_default().to_string())
    }

    /// Constant encoded size of a field kind, `None` if it depends on content
    pub fn kind_static_width(&self, kind: &FieldKind) -> Result<Option<u32>> {
        let width = self.kind_width(kind, &mut Vec::new())?;
        narrow(width, || kind.to_string())
    }

    /// Fewest bytes any encoding of `kind` can occupy
    pub fn min_encoded_size(&self, kind: &FieldKind) -> Result<u64> {
        Ok(self.kind_width(kind, &mut Vec::new())?.min)
    }

    /// Check that every type reachable from `id` is defined and that no
    /// type contains itself by value (which would have no finite size)
    pub fn validate(&self, id: SchemaId) -> Result<()> {
        let mut reachable = HashSet::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if !reachable.insert(next) {
                continue;
            }
            for field in self.fields(next)? {
                if let FieldKind::Object(target) = field.kind.innermost() {
                    pending.push(*target);
                }
            }
        }

        let mut done = HashSet::new();
        for schema in reachable {
            self.check_by_value_cycle(schema, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn check_by_value_cycle(
        &self,
        id: SchemaId,
        path: &mut Vec<SchemaId>,
        done: &mut HashSet<SchemaId>,
    ) -> Result<()> {
        if done.contains(&id) {
            return Ok(());
        }
        if path.contains(&id) {
            let cycle: Vec<&str> = path
                .iter()
                .chain(std::iter::once(&id))
                .filter_map(|s| self.name_of(*s))
                .collect();
            return Err(ChunkSchemaError::schema_violation(
                self.name_of(id).unwrap_or_default(),
                format!("contains itself by value ({})", cycle.join(" -> ")),
            ));
        }

        path.push(id);
        for field in self.fields(id)? {
            if let Some(child) = field.kind.embedded_schema() {
                self.check_by_value_cycle(child, path, done)?;
            }
        }
        path.pop();
        done.insert(id);
        Ok(())
    }

    fn schema_width(&self, id: SchemaId, visiting: &mut Vec<SchemaId>) -> Result<Width> {
        let entry = self
            .entries
            .get(id.index())
            .ok_or_else(|| ChunkSchemaError::unknown_handle(id))?;
        if let Some(width) = entry.width.get() {
            return Ok(*width);
        }
        if visiting.contains(&id) {
            return Err(ChunkSchemaError::schema_violation(
                entry.name.as_str(),
                "contains itself by value",
            ));
        }

        let schema = self.schema(id)?;
        visiting.push(id);
        let mut total = Width { min: 0, fixed: true };
        for field in &schema.fields {
            let width = self.kind_width(&field.kind, visiting)?;
            total.min = total.min.checked_add(width.min).ok_or_else(|| {
                ChunkSchemaError::schema_violation(schema.name(), "encoded size overflows")
            })?;
            total.fixed &= width.fixed;
        }
        visiting.pop();

        let _ = entry.width.set(total);
        Ok(total)
    }

    fn kind_width(&self, kind: &FieldKind, visiting: &mut Vec<SchemaId>) -> Result<Width> {
        match kind {
            FieldKind::Str | FieldKind::List(_) => Ok(Width { min: 4, fixed: false }),
            FieldKind::Object(id) => self.schema_width(*id, visiting),
            FieldKind::FixedArray(element, count) => {
                let width = self.kind_width(element, visiting)?;
                let min = width.min.checked_mul(u64::from(*count)).ok_or_else(|| {
                    ChunkSchemaError::schema_violation(kind.to_string(), "encoded size overflows")
                })?;
                Ok(Width { min, fixed: width.fixed })
            }
            primitive => match primitive.primitive_width() {
                Some(width) => Ok(Width {
                    min: u64::from(width),
                    fixed: true,
                }),
                None => Err(ChunkSchemaError::invalid_argument(
                    "kind",
                    format!("{} has no width", primitive),
                )),
            },
        }
    }
}

fn narrow(width: Width, name: impl FnOnce() -> String) -> Result<Option<u32>> {
    if !width.fixed {
        return Ok(None);
    }
    u32::try_from(width.min)
        .map(Some)
        .map_err(|_| ChunkSchemaError::schema_violation(name(), "fixed size exceeds u32"))
}

fn has_empty_array(kind: &FieldKind) -> bool {
    match kind {
        FieldKind::FixedArray(_, 0) => true,
        FieldKind::FixedArray(element, _) | FieldKind::List(element) => has_empty_array(element),
        _ => false,
    }
}
