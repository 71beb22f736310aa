//! Two-pass stream decoding
//!
//! [`scan`] walks the stream against the schema without touching any
//! instance; only a stream that scans cleanly is handed to [`apply`],
//! which writes into the destination graph.
//!
//! Every kind encodes to at least one byte, so a count is bounded by the
//! bytes left in the stream before any element is read.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;
use std::vec;

use log::trace;

use crate::error::{ChunkSchemaError, Result};
use crate::schema::{FieldDescriptor, FieldKind, SchemaCatalog, SchemaId};
use crate::value::{ObjectGraph, ObjectId, Value};

use super::io::ByteSource;

/// Upper bound on list capacity reserved before elements are read
const MAX_PREALLOC: usize = 4096;

enum ScanFrame<'c> {
    Fields {
        fields: &'c [FieldDescriptor],
        next: usize,
    },
    Repeat {
        element: &'c FieldKind,
        remaining: u32,
    },
}

/// Check that `source` holds one complete, well-formed encoding of `schema`
pub(crate) fn scan<S: ByteSource>(
    catalog: &SchemaCatalog,
    schema: SchemaId,
    source: &mut S,
) -> Result<()> {
    let mut stack = vec![ScanFrame::Fields {
        fields: catalog.fields(schema)?,
        next: 0,
    }];

    while let Some(top) = stack.last_mut() {
        let kind: &FieldKind = match top {
            ScanFrame::Fields { fields, next } => {
                let fields = *fields;
                match fields.get(*next) {
                    Some(field) => {
                        *next += 1;
                        &field.kind
                    }
                    None => {
                        stack.pop();
                        continue;
                    }
                }
            }
            ScanFrame::Repeat { element, remaining } => {
                if *remaining == 0 {
                    stack.pop();
                    continue;
                }
                *remaining -= 1;
                *element
            }
        };

        match kind {
            FieldKind::Str => {
                source.read_str_bytes()?;
            }
            FieldKind::List(element) => {
                let count = source.read_count()?;
                check_room(catalog, element, count, source.remaining())?;
                stack.push(ScanFrame::Repeat {
                    element,
                    remaining: count,
                });
            }
            FieldKind::FixedArray(element, count) => stack.push(ScanFrame::Repeat {
                element,
                remaining: *count,
            }),
            FieldKind::Object(nested) => stack.push(ScanFrame::Fields {
                fields: catalog.fields(*nested)?,
                next: 0,
            }),
            primitive => {
                read_primitive(primitive, source)?;
            }
        }
    }
    Ok(())
}

/// Fail early when `count` elements cannot fit the remainder even at
/// their smallest encoding
fn check_room(catalog: &SchemaCatalog, element: &FieldKind, count: u32, remaining: usize) -> Result<()> {
    let width = catalog.min_encoded_size(element)?.max(1);
    let needed = width.saturating_mul(u64::from(count));
    if needed > remaining as u64 {
        return Err(ChunkSchemaError::truncated(
            usize::try_from(needed).unwrap_or(usize::MAX),
            remaining,
        ));
    }
    Ok(())
}

fn read_primitive<S: ByteSource>(kind: &FieldKind, source: &mut S) -> Result<Value> {
    let value = match kind {
        FieldKind::Bool => Value::Bool(source.read_bool()?),
        FieldKind::Int8 => Value::Int8(source.read_i8()?),
        FieldKind::Int16 => Value::Int16(source.read_i16()?),
        FieldKind::Int32 => Value::Int32(source.read_i32()?),
        FieldKind::Int64 => Value::Int64(source.read_i64()?),
        FieldKind::Float32 => Value::Float32(source.read_f32()?),
        FieldKind::Float64 => Value::Float64(source.read_f64()?),
        FieldKind::Char => Value::Char(source.read_char()?),
        FieldKind::Ref(_) => Value::Ref(source.read_chunk_id()?),
        other => {
            return Err(ChunkSchemaError::invalid_argument(
                "kind",
                format!("{} is not a primitive", other),
            ))
        }
    };
    Ok(value)
}

enum ApplyFrame<'c> {
    Fields {
        node: ObjectId,
        fields: &'c [FieldDescriptor],
        next: usize,
    },
    Elements {
        element: &'c FieldKind,
        total: u32,
        items: Vec<Value>,
        reuse: vec::IntoIter<Value>,
    },
}

/// Overwrite the instance at `root` with the next encoding in `source`
///
/// Nested nodes already present in the instance are reused when their
/// schema matches; lists end up with exactly the encoded element count.
/// Nodes that drop out of the instance are released back to the graph.
pub(crate) fn apply<S: ByteSource>(graph: &mut ObjectGraph, root: ObjectId, source: &mut S) -> Result<()> {
    let catalog = Arc::clone(graph.catalog());
    let schema = graph.schema_of(root)?;
    let mut claimed = HashSet::from([root]);
    let mut dropped = Vec::new();
    let mut stack = vec![ApplyFrame::Fields {
        node: root,
        fields: catalog.fields(schema)?,
        next: 0,
    }];

    while let Some(top) = stack.last_mut() {
        let (kind, template): (&FieldKind, Option<Value>) = match top {
            ApplyFrame::Fields { node, fields, next } => {
                let fields = *fields;
                let Some(field) = fields.get(*next) else {
                    stack.pop();
                    continue;
                };
                let index = *next;
                *next += 1;
                let slot = field_slot(graph, *node, index)?;
                (&field.kind, Some(mem::replace(slot, Value::Bool(false))))
            }
            ApplyFrame::Elements {
                element,
                total,
                items,
                reuse,
            } => {
                if items.len() < *total as usize {
                    (*element, reuse.next())
                } else {
                    if let Some(ApplyFrame::Elements { items, reuse, .. }) = stack.pop() {
                        dropped.extend(reuse);
                        deliver(graph, &mut stack, Value::Array(items))?;
                    }
                    continue;
                }
            }
        };

        let value = match kind {
            FieldKind::Object(nested) => {
                let id = match template {
                    Some(Value::Object(id))
                        if graph.schema_of(id).ok() == Some(*nested) && claimed.insert(id) =>
                    {
                        id
                    }
                    other => {
                        dropped.extend(other);
                        let id = graph.instantiate_validated(*nested)?;
                        claimed.insert(id);
                        id
                    }
                };
                deliver(graph, &mut stack, Value::Object(id))?;
                stack.push(ApplyFrame::Fields {
                    node: id,
                    fields: catalog.fields(*nested)?,
                    next: 0,
                });
                continue;
            }
            FieldKind::List(element) => {
                let count = source.read_count()?;
                stack.push(elements(element, count, template));
                continue;
            }
            FieldKind::FixedArray(element, count) => {
                stack.push(elements(element, *count, template));
                continue;
            }
            FieldKind::Str => Value::Str(source.read_str()?),
            primitive => read_primitive(primitive, source)?,
        };
        deliver(graph, &mut stack, value)?;
    }

    let released = graph.release(dropped, &claimed);
    if released > 0 {
        trace!("decode released {} unused nodes", released);
    }
    Ok(())
}

fn elements(element: &FieldKind, total: u32, template: Option<Value>) -> ApplyFrame<'_> {
    let reuse = match template {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    ApplyFrame::Elements {
        element,
        total,
        items: Vec::with_capacity((total as usize).min(MAX_PREALLOC)),
        reuse: reuse.into_iter(),
    }
}

fn field_slot(graph: &mut ObjectGraph, node: ObjectId, index: usize) -> Result<&mut Value> {
    graph.node_mut(node)?.fields.get_mut(index).ok_or_else(|| {
        ChunkSchemaError::invalid_argument("object", format!("{} has no field #{}", node, index))
    })
}

/// Hand a finished value to the innermost open container
fn deliver(graph: &mut ObjectGraph, stack: &mut [ApplyFrame<'_>], value: Value) -> Result<()> {
    match stack.last_mut() {
        Some(ApplyFrame::Fields { node, next, .. }) => {
            *field_slot(graph, *node, *next - 1)? = value;
            Ok(())
        }
        Some(ApplyFrame::Elements { items, .. }) => {
            items.push(value);
            Ok(())
        }
        None => Err(ChunkSchemaError::invalid_argument(
            "stream",
            "value decoded outside of any object",
        )),
    }
}
