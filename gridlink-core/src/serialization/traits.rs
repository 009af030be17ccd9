//! Value serializers for the built-in types.

use super::{type_ids, DataInput, DataOutput};
use crate::error::Result;

/// A type that can be written in the grid's binary format.
pub trait Serializable {
    /// Serializer type ID recorded in the serialized header.
    const TYPE_ID: i32;

    /// Serializes this value to the given output.
    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()>;
}

/// A type that can be read back from the grid's binary format.
pub trait Deserializable: Sized {
    /// Serializer type ID this type expects in the serialized header.
    const TYPE_ID: i32;

    /// Deserializes a value from the given input.
    fn deserialize<R: DataInput>(input: &mut R) -> Result<Self>;
}

macro_rules! primitive_serializer {
    ($ty:ty, $type_id:expr, $write:ident, $read:ident) => {
        impl Serializable for $ty {
            const TYPE_ID: i32 = $type_id;

            fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
                output.$write(*self)
            }
        }

        impl Deserializable for $ty {
            const TYPE_ID: i32 = $type_id;

            fn deserialize<R: DataInput>(input: &mut R) -> Result<Self> {
                input.$read()
            }
        }
    };
}

primitive_serializer!(i8, type_ids::BYTE, write_byte, read_byte);
primitive_serializer!(bool, type_ids::BOOLEAN, write_bool, read_bool);
primitive_serializer!(i16, type_ids::SHORT, write_short, read_short);
primitive_serializer!(i32, type_ids::INTEGER, write_int, read_int);
primitive_serializer!(i64, type_ids::LONG, write_long, read_long);
primitive_serializer!(f64, type_ids::DOUBLE, write_double, read_double);

impl Serializable for str {
    const TYPE_ID: i32 = type_ids::STRING;

    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
        output.write_string(self)
    }
}

impl Serializable for String {
    const TYPE_ID: i32 = type_ids::STRING;

    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
        output.write_string(self)
    }
}

impl Deserializable for String {
    const TYPE_ID: i32 = type_ids::STRING;

    fn deserialize<R: DataInput>(input: &mut R) -> Result<Self> {
        input.read_string()
    }
}

impl Serializable for Vec<u8> {
    const TYPE_ID: i32 = type_ids::BYTE_ARRAY;

    fn serialize<W: DataOutput>(&self, output: &mut W) -> Result<()> {
        output.write_int(self.len() as i32)?;
        output.write_bytes(self)
    }
}

impl Deserializable for Vec<u8> {
    const TYPE_ID: i32 = type_ids::BYTE_ARRAY;

    fn deserialize<R: DataInput>(input: &mut R) -> Result<Self> {
        let len = input.read_int()?;
        input.read_bytes(len.max(0) as usize)
    }
}
