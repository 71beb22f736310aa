//! Field-level access to fixed-layout records in raw storage

use std::sync::Arc;

use crate::codec::{SliceSource, StreamCodec};
use crate::error::{ChunkSchemaError, Result};
use crate::layout::FixedLayout;
use crate::schema::FieldKind;
use crate::value::{ObjectGraph, ObjectId, Value};

use super::access::{RawAccess, RawAccessExt};

/// A fixed-layout record at `base` inside some raw storage
#[derive(Debug, Clone)]
pub struct RecordAccess<'l, A> {
    layout: &'l FixedLayout,
    access: A,
    base: usize,
}

impl<'l, A: RawAccess> RecordAccess<'l, A> {
    pub fn new(layout: &'l FixedLayout, access: A) -> Self {
        Self {
            layout,
            access,
            base: 0,
        }
    }

    pub fn layout(&self) -> &'l FixedLayout {
        self.layout
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    /// Absolute offset of a field path
    pub fn offset(&self, path: &str) -> Result<usize> {
        Ok(self.base + self.layout.locate(path)?.offset as usize)
    }

    /// Read a primitive field or an array of primitives
    pub fn read(&self, path: &str) -> Result<Value> {
        let located = self.layout.locate(path)?;
        read_value(&self.access, located.kind, self.base + located.offset as usize)
    }

    /// Write a primitive field or an array of primitives
    pub fn write(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let located = self.layout.locate(path)?;
        write_value(&self.access, located.kind, self.base + located.offset as usize, &value)
    }

    /// View of an embedded record
    pub fn nested(&self, path: &str) -> Result<RecordAccess<'l, &A>> {
        let located = self.layout.locate(path)?;
        match (located.kind, located.layout) {
            (FieldKind::Object(_), Some(layout)) => Ok(RecordAccess {
                layout,
                access: &self.access,
                base: self.base + located.offset as usize,
            }),
            (kind, _) => Err(ChunkSchemaError::invalid_argument(
                "path",
                format!("{} is a {}, not a record", path, kind),
            )),
        }
    }
}

fn read_value<A: RawAccess + ?Sized>(access: &A, kind: &FieldKind, offset: usize) -> Result<Value> {
    let value = match kind {
        FieldKind::Bool => Value::Bool(access.read_bool(offset)?),
        FieldKind::Int8 => Value::Int8(access.read_i8(offset)?),
        FieldKind::Int16 => Value::Int16(access.read_i16(offset)?),
        FieldKind::Int32 => Value::Int32(access.read_i32(offset)?),
        FieldKind::Int64 => Value::Int64(access.read_i64(offset)?),
        FieldKind::Float32 => Value::Float32(access.read_f32(offset)?),
        FieldKind::Float64 => Value::Float64(access.read_f64(offset)?),
        FieldKind::Char => Value::Char(access.read_char(offset)?),
        FieldKind::Ref(_) => Value::Ref(access.read_chunk_id(offset)?),
        FieldKind::FixedArray(element, count) => {
            let width = element_width(element)?;
            let mut items = Vec::with_capacity(*count as usize);
            for index in 0..*count as usize {
                items.push(read_value(access, element, offset + index * width)?);
            }
            Value::Array(items)
        }
        other => {
            return Err(ChunkSchemaError::invalid_argument(
                "kind",
                format!("{} cannot be read as a value", other),
            ))
        }
    };
    Ok(value)
}

fn write_value<A: RawAccess + ?Sized>(access: &A, kind: &FieldKind, offset: usize, value: &Value) -> Result<()> {
    match (kind, value) {
        (FieldKind::Bool, Value::Bool(v)) => access.write_bool(offset, *v),
        (FieldKind::Int8, Value::Int8(v)) => access.write_i8(offset, *v),
        (FieldKind::Int16, Value::Int16(v)) => access.write_i16(offset, *v),
        (FieldKind::Int32, Value::Int32(v)) => access.write_i32(offset, *v),
        (FieldKind::Int64, Value::Int64(v)) => access.write_i64(offset, *v),
        (FieldKind::Float32, Value::Float32(v)) => access.write_f32(offset, *v),
        (FieldKind::Float64, Value::Float64(v)) => access.write_f64(offset, *v),
        (FieldKind::Char, Value::Char(v)) => access.write_char(offset, *v),
        (FieldKind::Ref(_), Value::Ref(v)) => access.write_chunk_id(offset, *v),
        (FieldKind::FixedArray(element, count), Value::Array(items)) => {
            if items.len() != *count as usize {
                return Err(ChunkSchemaError::invalid_argument(
                    "array",
                    format!("expected {} elements, found {}", count, items.len()),
                ));
            }
            let width = element_width(element)?;
            for (index, item) in items.iter().enumerate() {
                write_value(access, element, offset + index * width, item)?;
            }
            Ok(())
        }
        (kind, value) => Err(ChunkSchemaError::invalid_argument(
            "value",
            format!("{} does not fit a {} field", value.kind_name(), kind),
        )),
    }
}

/// Width of an element readable without a layout (primitives and arrays of them)
fn element_width(kind: &FieldKind) -> Result<usize> {
    match kind {
        FieldKind::FixedArray(element, count) => Ok(element_width(element)? * *count as usize),
        other => other.primitive_width().map(|w| w as usize).ok_or_else(|| {
            ChunkSchemaError::invalid_argument(
                "kind",
                format!("{} elements need a nested record view", other),
            )
        }),
    }
}

/// Copies whole object instances into and out of fixed-layout storage
///
/// The stream encoding of a fixed-width type is byte-identical to its
/// fixed layout, so both directions go through the stream codec.
#[derive(Debug, Clone)]
pub struct FixedRecordCodec {
    codec: StreamCodec,
    layout: Arc<FixedLayout>,
}

impl FixedRecordCodec {
    pub fn new(codec: StreamCodec, layout: Arc<FixedLayout>) -> Self {
        Self { codec, layout }
    }

    pub fn layout(&self) -> &Arc<FixedLayout> {
        &self.layout
    }

    fn check_schema(&self, graph: &ObjectGraph, node: ObjectId) -> Result<()> {
        let schema = graph.schema_of(node)?;
        if schema != self.layout.schema() {
            return Err(ChunkSchemaError::invalid_argument(
                "object",
                format!("{} is a {}, layout is for {}", node, schema, self.layout.name()),
            ));
        }
        Ok(())
    }

    /// Write the instance at `node` as one record at offset 0 of `target`
    pub fn store<A: RawAccess + ?Sized>(&self, graph: &ObjectGraph, node: ObjectId, target: &A) -> Result<()> {
        self.check_schema(graph, node)?;
        let bytes = self.codec.encode_to_vec(graph, node)?;
        debug_assert_eq!(bytes.len(), self.layout.total_size() as usize);
        target.write_bytes(0, &bytes)
    }

    /// Overwrite the instance at `node` from the record at offset 0 of `source`
    pub fn load<A: RawAccess + ?Sized>(&self, graph: &mut ObjectGraph, node: ObjectId, source: &A) -> Result<()> {
        self.check_schema(graph, node)?;
        let mut bytes = vec![0u8; self.layout.total_size() as usize];
        source.read_bytes(0, &mut bytes)?;
        self.codec
            .decode_into(graph, node, &mut SliceSource::new(&bytes))
            .map(|_| ())
    }
}
