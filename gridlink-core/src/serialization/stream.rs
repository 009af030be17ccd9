//! Big-endian primitive streams used by value serializers.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{GridError, Result};

/// Writes primitive values in the grid's binary format.
///
/// All multi-byte values are written in big-endian byte order.
pub trait DataOutput {
    /// Writes a single byte.
    fn write_byte(&mut self, v: i8) -> Result<()>;

    /// Writes a boolean as a single byte (0 for false, 1 for true).
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Writes a 16-bit signed integer.
    fn write_short(&mut self, v: i16) -> Result<()>;

    /// Writes a 32-bit signed integer.
    fn write_int(&mut self, v: i32) -> Result<()>;

    /// Writes a 64-bit signed integer.
    fn write_long(&mut self, v: i64) -> Result<()>;

    /// Writes a 64-bit float.
    fn write_double(&mut self, v: f64) -> Result<()>;

    /// Writes raw bytes without a length prefix.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()>;

    /// Writes a UTF-8 string with its byte-length prefix.
    fn write_string(&mut self, v: &str) -> Result<()> {
        let len = i32::try_from(v.len()).map_err(|_| {
            GridError::Serialization(format!("string of {} bytes is too long", v.len()))
        })?;
        self.write_int(len)?;
        self.write_bytes(v.as_bytes())
    }
}

/// Reads primitive values written by a [`DataOutput`].
pub trait DataInput {
    /// Reads a single byte.
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a 16-bit signed integer.
    fn read_short(&mut self) -> Result<i16>;

    /// Reads a 32-bit signed integer.
    fn read_int(&mut self) -> Result<i32>;

    /// Reads a 64-bit signed integer.
    fn read_long(&mut self) -> Result<i64>;

    /// Reads a 64-bit float.
    fn read_double(&mut self) -> Result<f64>;

    /// Reads exactly `len` raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Reads a length-prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_int()?;
        let len = usize::try_from(len)
            .map_err(|_| GridError::Serialization(format!("invalid string length: {}", len)))?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes)
            .map_err(|e| GridError::Serialization(format!("invalid UTF-8 string: {}", e)))
    }
}

/// A growable buffer implementing [`DataOutput`].
#[derive(Debug, Default)]
pub struct ObjectDataOutput {
    buffer: BytesMut,
}

impl ObjectDataOutput {
    /// Creates an empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the output and returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

impl DataOutput for ObjectDataOutput {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.buffer.put_i8(v);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.buffer.put_u8(u8::from(v));
        Ok(())
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.buffer.put_i16(v);
        Ok(())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.buffer.put_i32(v);
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.buffer.put_i64(v);
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.buffer.put_f64(v);
        Ok(())
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.buffer.put_slice(v);
        Ok(())
    }
}

/// A cursor over a byte slice implementing [`DataInput`].
#[derive(Debug)]
pub struct ObjectDataInput<'a> {
    remaining: &'a [u8],
}

impl<'a> ObjectDataInput<'a> {
    /// Creates an input reading from the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { remaining: data }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.remaining.len() < n {
            Err(GridError::Serialization(format!(
                "insufficient data: need {} bytes, have {}",
                n,
                self.remaining.len()
            )))
        } else {
            Ok(())
        }
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_byte(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.remaining.get_i8())
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.ensure_remaining(1)?;
        Ok(self.remaining.get_u8() != 0)
    }

    fn read_short(&mut self) -> Result<i16> {
        self.ensure_remaining(2)?;
        Ok(self.remaining.get_i16())
    }

    fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.remaining.get_i32())
    }

    fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.remaining.get_i64())
    }

    fn read_double(&mut self) -> Result<f64> {
        self.ensure_remaining(8)?;
        Ok(self.remaining.get_f64())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_remaining(len)?;
        let (head, tail) = self.remaining.split_at(len);
        self.remaining = tail;
        Ok(head.to_vec())
    }
}
