//! Serialized form of keys and values.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Deserializable, ObjectDataInput, ObjectDataOutput, Serializable};
use crate::error::{GridError, Result};

/// Offset of the partition hash within the serialized form.
pub const PARTITION_HASH_OFFSET: usize = 0;
/// Offset of the serializer type ID within the serialized form.
pub const TYPE_OFFSET: usize = 4;
/// Offset of the value payload within the serialized form.
pub const DATA_OFFSET: usize = 8;

/// Seed of the partition hash.
const PARTITION_HASH_SEED: u32 = 0x0100_0193;

/// A serialized key or value as exchanged with the cluster.
///
/// Layout (big-endian): explicit partition hash (0 when absent), serializer
/// type ID, payload. Two `Data` are equal iff their bytes are equal, which is
/// what members use for key identity, so `Data` is the near-cache key type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Data {
    bytes: Bytes,
}

impl Data {
    /// Builds a `Data` from a serializer type ID and its payload.
    pub fn new(type_id: i32, payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(DATA_OFFSET + payload.len());
        buf.put_i32(0);
        buf.put_i32(type_id);
        buf.put_slice(payload);
        Self {
            bytes: buf.freeze(),
        }
    }

    /// Wraps bytes received from the wire.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < DATA_OFFSET {
            return Err(GridError::Serialization(format!(
                "serialized data of {} bytes is shorter than its {}-byte header",
                bytes.len(),
                DATA_OFFSET
            )));
        }
        Ok(Self { bytes })
    }

    /// Serializes `value` with its type's serializer ID.
    pub fn of<T: Serializable + ?Sized>(value: &T) -> Result<Self> {
        let mut output = ObjectDataOutput::new();
        value.serialize(&mut output)?;
        Ok(Self::new(T::TYPE_ID, output.as_bytes()))
    }

    /// Deserializes the payload as `T`.
    pub fn to_value<T: Deserializable>(&self) -> Result<T> {
        if self.type_id() != T::TYPE_ID {
            return Err(GridError::Serialization(format!(
                "expected serializer type {}, found {}",
                T::TYPE_ID,
                self.type_id()
            )));
        }
        let mut input = ObjectDataInput::new(self.payload());
        T::deserialize(&mut input)
    }

    /// Returns the serializer type ID.
    pub fn type_id(&self) -> i32 {
        read_i32_be(&self.bytes, TYPE_OFFSET)
    }

    /// Returns the value payload.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[DATA_OFFSET..]
    }

    /// Returns the complete serialized form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of serialized bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if there is no payload.
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == DATA_OFFSET
    }

    /// Returns the hash used to pick this key's partition.
    ///
    /// An explicit hash stored in the header wins; otherwise it is
    /// MurmurHash3 x86_32 over the payload.
    pub fn partition_hash(&self) -> i32 {
        match read_i32_be(&self.bytes, PARTITION_HASH_OFFSET) {
            0 => murmur3_x86_32(self.payload(), PARTITION_HASH_SEED),
            explicit => explicit,
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("type_id", &self.type_id())
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn read_i32_be(bytes: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Maps a hash onto `[0, count)` the same way members do.
pub fn hash_to_index(hash: i32, count: i32) -> i32 {
    if count <= 0 {
        return 0;
    }
    if hash == i32::MIN {
        0
    } else {
        hash.abs() % count
    }
}

/// MurmurHash3 x86 32-bit.
pub fn murmur3_x86_32(data: &[u8], seed: u32) -> i32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    fn mix_k1(k1: u32) -> u32 {
        k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
    }

    let mut h1 = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k1 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k1 ^= (*byte as u32) << (8 * i);
        }
        h1 ^= mix_k1(k1);
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1 as i32
}
