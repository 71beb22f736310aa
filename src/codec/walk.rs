//! Depth-first token walk over an object instance
//!
//! Sizing and encoding both consume the same token sequence, so they
//! agree on order and width by construction. The walk keeps its own
//! work stack; nesting depth of the data never grows the call stack.

use std::collections::HashSet;

use crate::error::{ChunkSchemaError, Result};
use crate::schema::{FieldKind, SchemaCatalog, SchemaId};
use crate::value::{ObjectGraph, ObjectId, Value};

use super::io::ByteSink;

/// One unit of encoded output
#[derive(Debug, Clone, Copy)]
pub(crate) enum Token<'g> {
    /// Primitive value in its natural width
    Scalar(&'g Value),
    /// Length-prefixed string
    Str(&'g str),
    /// Element count of a list
    Count(u32),
}

impl Token<'_> {
    pub(crate) fn encoded_len(&self) -> u64 {
        match self {
            Token::Scalar(value) => u64::from(scalar_width(value)),
            Token::Str(s) => 4 + s.len() as u64,
            Token::Count(_) => 4,
        }
    }

    pub(crate) fn write_to<S: ByteSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        match *self {
            Token::Scalar(value) => match *value {
                Value::Bool(v) => sink.write_bool(v),
                Value::Int8(v) => sink.write_i8(v),
                Value::Int16(v) => sink.write_i16(v),
                Value::Int32(v) => sink.write_i32(v),
                Value::Int64(v) => sink.write_i64(v),
                Value::Float32(v) => sink.write_f32(v),
                Value::Float64(v) => sink.write_f64(v),
                Value::Char(v) => sink.write_char(v),
                Value::Ref(v) => sink.write_chunk_id(v),
                Value::Str(_) | Value::Array(_) | Value::Object(_) => Err(
                    ChunkSchemaError::invalid_argument("value", "composite value in scalar position"),
                ),
            },
            Token::Str(s) => sink.write_str(s),
            Token::Count(count) => sink.write_u32(count),
        }
    }
}

fn scalar_width(value: &Value) -> u32 {
    match value {
        Value::Bool(_) | Value::Int8(_) => 1,
        Value::Int16(_) | Value::Char(_) => 2,
        Value::Int32(_) | Value::Float32(_) => 4,
        Value::Int64(_) | Value::Float64(_) | Value::Ref(_) => 8,
        Value::Str(_) | Value::Array(_) | Value::Object(_) => 0,
    }
}

/// Iterator of tokens for one root object
///
/// Every object node may be visited once; a node reachable twice (shared
/// or cyclic data) cannot be represented in the tree-shaped stream and is
/// rejected.
pub(crate) struct Walk<'g> {
    graph: &'g ObjectGraph,
    catalog: &'g SchemaCatalog,
    stack: Vec<(&'g FieldKind, &'g Value)>,
    visited: HashSet<ObjectId>,
}

impl<'g> Walk<'g> {
    pub(crate) fn new(graph: &'g ObjectGraph, root: ObjectId) -> Result<Self> {
        let mut walk = Self {
            graph,
            catalog: graph.catalog().as_ref(),
            stack: Vec::new(),
            visited: HashSet::new(),
        };
        walk.push_object(root, None)?;
        Ok(walk)
    }

    fn push_object(&mut self, id: ObjectId, expected: Option<SchemaId>) -> Result<()> {
        if !self.visited.insert(id) {
            return Err(ChunkSchemaError::invalid_argument(
                "object",
                format!("{} is referenced more than once", id),
            ));
        }

        let node = self.graph.node(id)?;
        if let Some(schema) = expected {
            if node.schema() != schema {
                return Err(ChunkSchemaError::invalid_argument(
                    "object",
                    format!("{} is a {}, expected {}", id, node.schema(), schema),
                ));
            }
        }

        let fields = self.catalog.fields(node.schema())?;
        if fields.len() != node.fields().len() {
            return Err(ChunkSchemaError::invalid_argument(
                "object",
                format!("{} has {} values for {} fields", id, node.fields().len(), fields.len()),
            ));
        }
        for (field, value) in fields.iter().zip(node.fields()).rev() {
            self.stack.push((&field.kind, value));
        }
        Ok(())
    }

    fn step(&mut self, kind: &'g FieldKind, value: &'g Value) -> Result<Option<Token<'g>>> {
        match (kind, value) {
            (FieldKind::Str, Value::Str(s)) => Ok(Some(Token::Str(s))),
            (FieldKind::List(element), Value::Array(items)) => {
                let count = u32::try_from(items.len()).map_err(|_| {
                    ChunkSchemaError::invalid_argument("list", "more than u32::MAX elements")
                })?;
                for item in items.iter().rev() {
                    self.stack.push((element.as_ref(), item));
                }
                Ok(Some(Token::Count(count)))
            }
            (FieldKind::FixedArray(element, count), Value::Array(items)) => {
                if items.len() != *count as usize {
                    return Err(ChunkSchemaError::invalid_argument(
                        "array",
                        format!("expected {} elements, found {}", count, items.len()),
                    ));
                }
                for item in items.iter().rev() {
                    self.stack.push((element.as_ref(), item));
                }
                Ok(None)
            }
            (FieldKind::Object(schema), Value::Object(id)) => {
                self.push_object(*id, Some(*schema))?;
                Ok(None)
            }
            (kind, value) if value.matches_primitive(kind) => Ok(Some(Token::Scalar(value))),
            (kind, value) => Err(ChunkSchemaError::invalid_argument(
                "value",
                format!("{} does not fit a {} field", value.kind_name(), kind),
            )),
        }
    }
}

impl<'g> Iterator for Walk<'g> {
    type Item = Result<Token<'g>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (kind, value) = self.stack.pop()?;
            match self.step(kind, value) {
                Ok(Some(token)) => return Some(Ok(token)),
                Ok(None) => continue,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
