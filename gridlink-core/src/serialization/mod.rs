//! Binary serialization of keys and values.

mod data;
mod stream;
mod traits;

pub use data::{hash_to_index, murmur3_x86_32, Data, DATA_OFFSET, PARTITION_HASH_OFFSET, TYPE_OFFSET};
pub use stream::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};
pub use traits::{Deserializable, Serializable};

/// Serializer type IDs of the built-in types.
pub mod type_ids {
    /// A null reference.
    pub const NULL: i32 = 0;
    /// `i8`.
    pub const BYTE: i32 = -3;
    /// `bool`.
    pub const BOOLEAN: i32 = -4;
    /// `i16`.
    pub const SHORT: i32 = -6;
    /// `i32`.
    pub const INTEGER: i32 = -7;
    /// `i64`.
    pub const LONG: i32 = -8;
    /// `f64`.
    pub const DOUBLE: i32 = -10;
    /// UTF-8 strings.
    pub const STRING: i32 = -11;
    /// Byte arrays.
    pub const BYTE_ARRAY: i32 = -12;
}
