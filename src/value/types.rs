//! Field values of object instances

use crate::chunk::ChunkId;
use crate::error::{ChunkSchemaError, Result};
use crate::schema::FieldKind;

use super::graph::ObjectId;

/// Value stored in one field of an object node
///
/// Nested objects are referenced by [`ObjectId`] into the owning
/// [`super::ObjectGraph`]; arrays own their elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Char(char),
    Str(String),
    Array(Vec<Value>),
    Object(ObjectId),
    /// Stored record named by chunk id; [`ChunkId::NULL`] when unset
    Ref(ChunkId),
}

impl Value {
    /// Zero value of a primitive, string or array kind
    ///
    /// Fixed arrays get `count` defaults; `None` for kinds that need a
    /// graph node (objects, or fixed arrays of objects).
    pub fn default_for(kind: &FieldKind) -> Option<Value> {
        Some(match kind {
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Int8 => Value::Int8(0),
            FieldKind::Int16 => Value::Int16(0),
            FieldKind::Int32 => Value::Int32(0),
            FieldKind::Int64 => Value::Int64(0),
            FieldKind::Float32 => Value::Float32(0.0),
            FieldKind::Float64 => Value::Float64(0.0),
            FieldKind::Char => Value::Char('\0'),
            FieldKind::Str => Value::Str(String::new()),
            FieldKind::List(_) => Value::Array(Vec::new()),
            FieldKind::FixedArray(element, count) => {
                let mut items = Vec::with_capacity(*count as usize);
                for _ in 0..*count {
                    items.push(Value::default_for(element)?);
                }
                Value::Array(items)
            }
            FieldKind::Ref(_) => Value::Ref(ChunkId::NULL),
            FieldKind::Object(_) => return None,
        })
    }

    /// Short name of the variant for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Ref(_) => "ref",
        }
    }

    /// True if this is a primitive value of exactly `kind`
    pub(crate) fn matches_primitive(&self, kind: &FieldKind) -> bool {
        matches!(
            (self, kind),
            (Value::Bool(_), FieldKind::Bool)
                | (Value::Int8(_), FieldKind::Int8)
                | (Value::Int16(_), FieldKind::Int16)
                | (Value::Int32(_), FieldKind::Int32)
                | (Value::Int64(_), FieldKind::Int64)
                | (Value::Float32(_), FieldKind::Float32)
                | (Value::Float64(_), FieldKind::Float64)
                | (Value::Char(_), FieldKind::Char)
                | (Value::Ref(_), FieldKind::Ref(_))
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_chunk_id(&self) -> Option<ChunkId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

/// UTF-16 code unit stored for a `Char` field
pub(crate) fn char_to_unit(value: char) -> Result<u16> {
    u16::try_from(u32::from(value)).map_err(|_| {
        ChunkSchemaError::invalid_argument(
            "char",
            format!("{:?} is outside the basic multilingual plane", value),
        )
    })
}

/// Character held by a stored code unit; lone surrogates are rejected
pub(crate) fn unit_to_char(unit: u16) -> Result<char> {
    char::from_u32(u32::from(unit)).ok_or_else(|| {
        ChunkSchemaError::invalid_argument("char", format!("{:#06x} is a surrogate", unit))
    })
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    char => Char,
    String => Str,
    ObjectId => Object,
    ChunkId => Ref,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(Value::default_for(&FieldKind::Int32), Some(Value::Int32(0)));
        assert_eq!(
            Value::default_for(&FieldKind::fixed_array(FieldKind::Bool, 2)),
            Some(Value::Array(vec![Value::Bool(false), Value::Bool(false)]))
        );
        assert_eq!(
            Value::default_for(&FieldKind::list(FieldKind::Str)),
            Some(Value::Array(Vec::new()))
        );
        assert_eq!(
            Value::default_for(&FieldKind::Ref(crate::schema::SchemaId(0))),
            Some(Value::Ref(ChunkId::NULL))
        );
    }

    #[test]
    fn test_char_code_units() {
        assert_eq!(char_to_unit('λ').unwrap(), 0x03BB);
        assert_eq!(unit_to_char(0x03BB).unwrap(), 'λ');
        assert!(char_to_unit('🦀').is_err());
        assert!(unit_to_char(0xDC00).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(7i16), Value::Int16(7));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(
            Value::from(vec![1i32, 2]),
            Value::Array(vec![Value::Int32(1), Value::Int32(2)])
        );
    }
}
