//! Primitive reads and writes at byte offsets

use crate::chunk::{ChunkId, ChunkManager};
use crate::error::{ChunkSchemaError, Result};
use crate::value::{char_to_unit, unit_to_char};

/// Byte-addressable record storage
///
/// Writes take `&self`: the storage is shared memory and callers that
/// need read-modify-write atomicity serialise among themselves.
pub trait RawAccess {
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()>;

    fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()>;
}

impl<T: RawAccess + ?Sized> RawAccess for &T {
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        (**self).read_bytes(offset, buf)
    }

    fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        (**self).write_bytes(offset, bytes)
    }
}

macro_rules! raw_primitives {
    ($($ty:ty => $read:ident, $write:ident, $read_array:ident, $write_array:ident;)*) => {
        $(
            fn $read(&self, offset: usize) -> Result<$ty> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                self.read_bytes(offset, &mut buf)?;
                Ok(<$ty>::from_le_bytes(buf))
            }

            fn $write(&self, offset: usize, value: $ty) -> Result<()> {
                self.write_bytes(offset, &value.to_le_bytes())
            }

            fn $read_array(&self, offset: usize, count: usize) -> Result<Vec<$ty>> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let mut buf = vec![0u8; array_len(count, WIDTH)?];
                self.read_bytes(offset, &mut buf)?;
                Ok(buf
                    .chunks_exact(WIDTH)
                    .map(|bytes| {
                        let mut raw = [0u8; WIDTH];
                        raw.copy_from_slice(bytes);
                        <$ty>::from_le_bytes(raw)
                    })
                    .collect())
            }

            fn $write_array(&self, offset: usize, values: &[$ty]) -> Result<()> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let mut buf = Vec::with_capacity(array_len(values.len(), WIDTH)?);
                for value in values {
                    buf.extend_from_slice(&value.to_le_bytes());
                }
                self.write_bytes(offset, &buf)
            }
        )*
    };
}

fn array_len(count: usize, width: usize) -> Result<usize> {
    count.checked_mul(width).ok_or_else(|| {
        ChunkSchemaError::invalid_argument("count", format!("{} elements overflow", count))
    })
}

fn decode_bool(byte: u8) -> Result<bool> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ChunkSchemaError::invalid_argument(
            "bool",
            format!("byte {:#04x} is not a bool", other),
        )),
    }
}

/// Typed little-endian accessors on top of [`RawAccess`]
pub trait RawAccessExt: RawAccess {
    raw_primitives! {
        u8 => read_u8, write_u8, read_u8_array, write_u8_array;
        i8 => read_i8, write_i8, read_i8_array, write_i8_array;
        u16 => read_u16, write_u16, read_u16_array, write_u16_array;
        i16 => read_i16, write_i16, read_i16_array, write_i16_array;
        i32 => read_i32, write_i32, read_i32_array, write_i32_array;
        i64 => read_i64, write_i64, read_i64_array, write_i64_array;
        u64 => read_u64, write_u64, read_u64_array, write_u64_array;
        f32 => read_f32, write_f32, read_f32_array, write_f32_array;
        f64 => read_f64, write_f64, read_f64_array, write_f64_array;
    }

    fn read_bool(&self, offset: usize) -> Result<bool> {
        decode_bool(self.read_u8(offset)?)
    }

    fn write_bool(&self, offset: usize, value: bool) -> Result<()> {
        self.write_u8(offset, u8::from(value))
    }

    fn read_bool_array(&self, offset: usize, count: usize) -> Result<Vec<bool>> {
        self.read_u8_array(offset, count)?
            .into_iter()
            .map(decode_bool)
            .collect()
    }

    fn write_bool_array(&self, offset: usize, values: &[bool]) -> Result<()> {
        let bytes: Vec<u8> = values.iter().map(|v| u8::from(*v)).collect();
        self.write_bytes(offset, &bytes)
    }

    /// UTF-16 code unit stored as a `u16`
    fn read_char(&self, offset: usize) -> Result<char> {
        unit_to_char(self.read_u16(offset)?)
    }

    fn write_char(&self, offset: usize, value: char) -> Result<()> {
        self.write_u16(offset, char_to_unit(value)?)
    }

    fn read_chunk_id(&self, offset: usize) -> Result<ChunkId> {
        Ok(ChunkId::from_raw(self.read_u64(offset)?))
    }

    fn write_chunk_id(&self, offset: usize, value: ChunkId) -> Result<()> {
        self.write_u64(offset, value.raw())
    }

    fn read_chunk_id_array(&self, offset: usize, count: usize) -> Result<Vec<ChunkId>> {
        Ok(self
            .read_u64_array(offset, count)?
            .into_iter()
            .map(ChunkId::from_raw)
            .collect())
    }

    fn write_chunk_id_array(&self, offset: usize, values: &[ChunkId]) -> Result<()> {
        let raw: Vec<u64> = values.iter().map(|id| id.raw()).collect();
        self.write_u64_array(offset, &raw)
    }
}

// Blanket implementation for all raw accessors
impl<T: RawAccess + ?Sized> RawAccessExt for T {}

/// Accessor that goes through the chunk service on every call
#[derive(Debug, Clone, Copy)]
pub struct HandleAccess<'a> {
    manager: &'a ChunkManager,
    id: ChunkId,
}

impl<'a> HandleAccess<'a> {
    pub fn new(manager: &'a ChunkManager, id: ChunkId) -> Self {
        Self { manager, id }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }
}

impl RawAccess for HandleAccess<'_> {
    fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.manager.read(self.id, offset, buf)
    }

    fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.manager.write(self.id, offset, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Plain heap buffer standing in for chunk storage
    struct Buffer(RefCell<Vec<u8>>);

    impl RawAccess for Buffer {
        fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
            buf.copy_from_slice(&self.0.borrow()[offset..offset + buf.len()]);
            Ok(())
        }

        fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<()> {
            self.0.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_primitive_pairs() {
        let buffer = Buffer(RefCell::new(vec![0; 64]));
        buffer.write_i64(0, -5).unwrap();
        buffer.write_f32(8, 1.5).unwrap();
        buffer.write_char(12, 'λ').unwrap();
        buffer.write_bool(16, true).unwrap();
        buffer.write_i16(17, 0x0102).unwrap();
        assert!(buffer.write_char(14, '🦀').is_err());

        assert_eq!(buffer.read_i64(0).unwrap(), -5);
        assert_eq!(buffer.read_f32(8).unwrap(), 1.5);
        assert_eq!(buffer.read_char(12).unwrap(), 'λ');
        assert!(buffer.read_bool(16).unwrap());
        assert_eq!(&buffer.0.borrow()[12..14], &[0xBB, 0x03]);
        assert_eq!(&buffer.0.borrow()[17..19], &[0x02, 0x01]);
    }

    #[test]
    fn test_arrays() {
        let buffer = Buffer(RefCell::new(vec![0; 64]));
        buffer.write_i32_array(4, &[1, -2, 3]).unwrap();
        assert_eq!(buffer.read_i32_array(4, 3).unwrap(), vec![1, -2, 3]);

        buffer.write_bool_array(20, &[true, false]).unwrap();
        assert_eq!(buffer.read_bool_array(20, 2).unwrap(), vec![true, false]);

        let friends = [ChunkId::new(1, 4), ChunkId::INVALID];
        buffer.write_chunk_id_array(24, &friends).unwrap();
        assert_eq!(buffer.read_chunk_id_array(24, 2).unwrap(), friends.to_vec());
        assert_eq!(buffer.read_chunk_id(32).unwrap(), ChunkId::INVALID);
    }

    #[test]
    fn test_invalid_bool_byte() {
        let buffer = Buffer(RefCell::new(vec![7, 0x00, 0xD8, 0]));
        assert!(buffer.read_bool(0).is_err());
        assert!(buffer.read_char(1).is_err());
    }
}
