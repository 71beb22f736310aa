//! Ordered byte sinks and sources
//!
//! All fixed-width values are little-endian. Strings are a `u32` byte
//! length followed by UTF-8; counts are a plain `u32`. A char is one
//! UTF-16 code unit.

use crate::chunk::ChunkId;
use crate::error::{ChunkSchemaError, Result};
use crate::value::{char_to_unit, unit_to_char};

macro_rules! sink_primitives {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            fn $name(&mut self, value: $ty) -> Result<()> {
                self.write_bytes(&value.to_le_bytes())
            }
        )*
    };
}

macro_rules! source_primitives {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            fn $name(&mut self) -> Result<$ty> {
                Ok(<$ty>::from_le_bytes(self.read_array()?))
            }
        )*
    };
}

/// Destination of an encoded stream
pub trait ByteSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Bytes written so far
    fn bytes_written(&self) -> usize;

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_bytes(&[u8::from(value)])
    }

    sink_primitives! {
        write_u8: u8,
        write_i8: i8,
        write_i16: i16,
        write_i32: i32,
        write_i64: i64,
        write_u16: u16,
        write_u32: u32,
        write_u64: u64,
        write_f32: f32,
        write_f64: f64,
    }

    /// Fails for characters outside the basic multilingual plane
    fn write_char(&mut self, value: char) -> Result<()> {
        self.write_u16(char_to_unit(value)?)
    }

    fn write_chunk_id(&mut self, value: ChunkId) -> Result<()> {
        self.write_u64(value.raw())
    }

    /// Element count prefix of a list
    fn write_count(&mut self, count: usize) -> Result<()> {
        let count = u32::try_from(count).map_err(|_| {
            ChunkSchemaError::invalid_argument("count", format!("{} exceeds u32", count))
        })?;
        self.write_u32(count)
    }

    /// Length-prefixed UTF-8 string
    fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_count(value.len())?;
        self.write_bytes(value.as_bytes())
    }
}

/// Origin of an encoded stream
pub trait ByteSource {
    fn remaining(&self) -> usize;

    /// Bytes consumed so far
    fn position(&self) -> usize;

    /// Take the next `len` bytes, failing with `TruncatedStream` if fewer remain
    fn read_bytes(&mut self, len: usize) -> Result<&[u8]>;

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    source_primitives! {
        read_u8: u8,
        read_i8: i8,
        read_i16: i16,
        read_i32: i32,
        read_i64: i64,
        read_u16: u16,
        read_u32: u32,
        read_u64: u64,
        read_f32: f32,
        read_f64: f64,
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ChunkSchemaError::invalid_argument(
                "bool",
                format!("byte {:#04x} is not a bool", other),
            )),
        }
    }

    fn read_char(&mut self) -> Result<char> {
        unit_to_char(self.read_u16()?)
    }

    fn read_chunk_id(&mut self) -> Result<ChunkId> {
        Ok(ChunkId::from_raw(self.read_u64()?))
    }

    fn read_count(&mut self) -> Result<u32> {
        self.read_u32()
    }

    /// Length-prefixed UTF-8 string, borrowed from the source
    fn read_str_bytes(&mut self) -> Result<&str> {
        let len = self.read_count()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map_err(|e| ChunkSchemaError::invalid_argument("string", format!("invalid UTF-8: {}", e)))
    }

    fn read_str(&mut self) -> Result<String> {
        self.read_str_bytes().map(str::to_owned)
    }
}

/// Growable in-memory sink
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    buf: Vec<u8>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl ByteSink for VecSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn bytes_written(&self) -> usize {
        self.buf.len()
    }
}

/// Cursor over a borrowed byte slice
#[derive(Debug, Clone, Copy)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for SliceSource<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ChunkSchemaError::truncated(len, remaining));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }
}
