//! Fixed-size field encoding at known offsets of a frame.
//!
//! All multi-byte values are little-endian. Writers expect the frame to be
//! pre-sized by the caller (see [`Frame::zeroed`](super::Frame::zeroed));
//! readers check bounds and report a protocol error on short frames.

use uuid::Uuid;

use super::constants::*;
use crate::error::{GridError, Result};

fn field<'a>(buf: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    buf.get(offset..offset + len).ok_or_else(|| {
        GridError::Protocol(format!(
            "fixed-size field at offset {} (width {}) exceeds frame of {} bytes",
            offset,
            len,
            buf.len()
        ))
    })
}

/// Writes a byte at `offset`.
pub fn encode_u8(buf: &mut [u8], offset: usize, value: u8) {
    buf[offset] = value;
}

/// Reads a byte at `offset`.
pub fn decode_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(field(buf, offset, BYTE_SIZE_IN_BYTES)?[0])
}

/// Writes a boolean as a single byte.
pub fn encode_bool(buf: &mut [u8], offset: usize, value: bool) {
    buf[offset] = u8::from(value);
}

/// Reads a boolean written by [`encode_bool`].
pub fn decode_bool(buf: &[u8], offset: usize) -> Result<bool> {
    Ok(decode_u8(buf, offset)? != 0)
}

/// Writes an i32 at `offset`.
pub fn encode_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + INT_SIZE_IN_BYTES].copy_from_slice(&value.to_le_bytes());
}

/// Reads an i32 at `offset`.
pub fn decode_i32(buf: &[u8], offset: usize) -> Result<i32> {
    let bytes = field(buf, offset, INT_SIZE_IN_BYTES)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Writes an i64 at `offset`.
pub fn encode_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + LONG_SIZE_IN_BYTES].copy_from_slice(&value.to_le_bytes());
}

/// Reads an i64 at `offset`.
pub fn decode_i64(buf: &[u8], offset: usize) -> Result<i64> {
    let bytes = field(buf, offset, LONG_SIZE_IN_BYTES)?;
    let mut raw = [0u8; LONG_SIZE_IN_BYTES];
    raw.copy_from_slice(bytes);
    Ok(i64::from_le_bytes(raw))
}

/// Writes a nullable UUID: an is-null byte, then the most and least
/// significant halves.
pub fn encode_uuid(buf: &mut [u8], offset: usize, value: Option<Uuid>) {
    match value {
        Some(uuid) => {
            let raw = uuid.as_u128();
            encode_bool(buf, offset, false);
            encode_i64(buf, offset + BOOLEAN_SIZE_IN_BYTES, (raw >> 64) as i64);
            encode_i64(
                buf,
                offset + BOOLEAN_SIZE_IN_BYTES + LONG_SIZE_IN_BYTES,
                raw as u64 as i64,
            );
        }
        None => {
            encode_bool(buf, offset, true);
            buf[offset + BOOLEAN_SIZE_IN_BYTES..offset + UUID_SIZE_IN_BYTES].fill(0);
        }
    }
}

/// Reads a nullable UUID written by [`encode_uuid`].
pub fn decode_uuid(buf: &[u8], offset: usize) -> Result<Option<Uuid>> {
    field(buf, offset, UUID_SIZE_IN_BYTES)?;
    if decode_bool(buf, offset)? {
        return Ok(None);
    }
    let msb = decode_i64(buf, offset + BOOLEAN_SIZE_IN_BYTES)? as u64;
    let lsb = decode_i64(buf, offset + BOOLEAN_SIZE_IN_BYTES + LONG_SIZE_IN_BYTES)? as u64;
    Ok(Some(Uuid::from_u128(((msb as u128) << 64) | lsb as u128)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_and_long_are_little_endian() {
        let mut buf = [0u8; 12];
        encode_i32(&mut buf, 0, 0x0B0200);
        encode_i64(&mut buf, 4, -2);

        assert_eq!(&buf[..4], &[0x00, 0x02, 0x0B, 0x00]);
        assert_eq!(decode_i32(&buf, 0).unwrap(), 0x0B0200);
        assert_eq!(decode_i64(&buf, 4).unwrap(), -2);
    }

    #[test]
    fn test_bool_and_byte() {
        let mut buf = [0u8; 2];
        encode_bool(&mut buf, 0, true);
        encode_u8(&mut buf, 1, 7);
        assert!(decode_bool(&buf, 0).unwrap());
        assert_eq!(decode_u8(&buf, 1).unwrap(), 7);
    }

    #[test]
    fn test_uuid_present_and_null() {
        let uuid = Uuid::new_v4();
        let mut buf = [0xFFu8; UUID_SIZE_IN_BYTES * 2];
        encode_uuid(&mut buf, 0, Some(uuid));
        encode_uuid(&mut buf, UUID_SIZE_IN_BYTES, None);

        assert_eq!(decode_uuid(&buf, 0).unwrap(), Some(uuid));
        assert_eq!(decode_uuid(&buf, UUID_SIZE_IN_BYTES).unwrap(), None);
    }

    #[test]
    fn test_short_frame_is_protocol_error() {
        let buf = [0u8; 6];
        assert!(matches!(decode_i64(&buf, 0), Err(GridError::Protocol(_))));
        assert!(matches!(decode_i32(&buf, 4), Err(GridError::Protocol(_))));
        assert!(matches!(decode_uuid(&buf, 0), Err(GridError::Protocol(_))));
    }
}
