//! Encoders and decoders for the variable-size field types shared by all
//! operation codecs.
//!
//! Each field occupies one frame, except lists of variable-size items and
//! entry lists, which are bracketed by begin/end data-structure frames.
//! Lists of fixed-size items are packed into a single frame.

use bytes::{BufMut, BytesMut};
use uuid::Uuid;

use super::client_message::ClientMessage;
use super::constants::*;
use super::fixed;
use super::frame::Frame;
use super::reader::FrameReader;
use crate::error::{GridError, Result};
use crate::serialization::Data;

/// Appends a UTF-8 string frame.
pub fn encode_string(message: &mut ClientMessage, value: &str) {
    message.add_frame(Frame::with_content(BytesMut::from(value.as_bytes())));
}

/// Reads a UTF-8 string frame.
pub fn decode_string(reader: &mut FrameReader<'_>) -> Result<String> {
    let frame = reader.next_frame()?;
    String::from_utf8(frame.content.to_vec())
        .map_err(|e| GridError::Protocol(format!("invalid UTF-8 in string frame: {}", e)))
}

/// Appends a serialized key or value frame.
pub fn encode_data(message: &mut ClientMessage, value: &Data) {
    message.add_frame(Frame::with_content(BytesMut::from(value.as_bytes())));
}

/// Reads a serialized key or value frame.
pub fn decode_data(reader: &mut FrameReader<'_>) -> Result<Data> {
    let frame = reader.next_frame()?;
    Data::from_bytes(frame.content.clone().freeze())
}

/// Appends a raw byte array frame.
pub fn encode_byte_array(message: &mut ClientMessage, value: &[u8]) {
    message.add_frame(Frame::with_content(BytesMut::from(value)));
}

/// Reads a raw byte array frame.
pub fn decode_byte_array(reader: &mut FrameReader<'_>) -> Result<Vec<u8>> {
    Ok(reader.next_frame()?.content.to_vec())
}

/// Appends `value` with `encode`, or a null frame when absent.
pub fn encode_nullable<T: ?Sized>(
    message: &mut ClientMessage,
    value: Option<&T>,
    encode: impl FnOnce(&mut ClientMessage, &T),
) {
    match value {
        Some(v) => encode(message, v),
        None => message.add_frame(Frame::new_null_frame()),
    }
}

/// Reads a value with `decode` unless the next frame is a null frame.
pub fn decode_nullable<'a, T>(
    reader: &mut FrameReader<'a>,
    decode: impl FnOnce(&mut FrameReader<'a>) -> Result<T>,
) -> Result<Option<T>> {
    if reader.next_is_null() {
        Ok(None)
    } else {
        decode(reader).map(Some)
    }
}

/// Appends a list of variable-size items.
pub fn encode_list<T>(
    message: &mut ClientMessage,
    items: &[T],
    mut encode: impl FnMut(&mut ClientMessage, &T),
) {
    message.add_frame(Frame::new_begin_frame());
    for item in items {
        encode(message, item);
    }
    message.add_frame(Frame::new_end_frame());
}

/// Reads a list of variable-size items.
pub fn decode_list<'a, T>(
    reader: &mut FrameReader<'a>,
    mut decode: impl FnMut(&mut FrameReader<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    reader.expect_begin()?;
    let mut items = Vec::new();
    while !reader.next_is_struct_end() {
        items.push(decode(reader)?);
    }
    Ok(items)
}

/// Appends a list of key/value pairs with variable-size keys and values.
pub fn encode_entry_list<K, V>(
    message: &mut ClientMessage,
    entries: &[(K, V)],
    mut encode_key: impl FnMut(&mut ClientMessage, &K),
    mut encode_value: impl FnMut(&mut ClientMessage, &V),
) {
    message.add_frame(Frame::new_begin_frame());
    for (key, value) in entries {
        encode_key(message, key);
        encode_value(message, value);
    }
    message.add_frame(Frame::new_end_frame());
}

/// Reads a list of key/value pairs.
pub fn decode_entry_list<'a, K, V>(
    reader: &mut FrameReader<'a>,
    mut decode_key: impl FnMut(&mut FrameReader<'a>) -> Result<K>,
    mut decode_value: impl FnMut(&mut FrameReader<'a>) -> Result<V>,
) -> Result<Vec<(K, V)>> {
    reader.expect_begin()?;
    let mut entries = Vec::new();
    while !reader.next_is_struct_end() {
        let key = decode_key(reader)?;
        let value = decode_value(reader)?;
        entries.push((key, value));
    }
    Ok(entries)
}

fn packed<'a>(reader: &mut FrameReader<'a>, item_size: usize) -> Result<&'a [u8]> {
    let content = &reader.next_frame()?.content[..];
    if content.len() % item_size != 0 {
        return Err(GridError::Protocol(format!(
            "packed list of {} bytes is not a multiple of the {}-byte item size",
            content.len(),
            item_size
        )));
    }
    Ok(content)
}

/// Appends a packed list of i32.
pub fn encode_int_list(message: &mut ClientMessage, items: &[i32]) {
    let mut content = BytesMut::with_capacity(items.len() * INT_SIZE_IN_BYTES);
    for item in items {
        content.put_i32_le(*item);
    }
    message.add_frame(Frame::with_content(content));
}

/// Reads a packed list of i32.
pub fn decode_int_list(reader: &mut FrameReader<'_>) -> Result<Vec<i32>> {
    let content = packed(reader, INT_SIZE_IN_BYTES)?;
    (0..content.len() / INT_SIZE_IN_BYTES)
        .map(|i| fixed::decode_i32(content, i * INT_SIZE_IN_BYTES))
        .collect()
}

/// Appends a packed list of i64.
pub fn encode_long_list(message: &mut ClientMessage, items: &[i64]) {
    let mut content = BytesMut::with_capacity(items.len() * LONG_SIZE_IN_BYTES);
    for item in items {
        content.put_i64_le(*item);
    }
    message.add_frame(Frame::with_content(content));
}

/// Reads a packed list of i64.
pub fn decode_long_list(reader: &mut FrameReader<'_>) -> Result<Vec<i64>> {
    let content = packed(reader, LONG_SIZE_IN_BYTES)?;
    (0..content.len() / LONG_SIZE_IN_BYTES)
        .map(|i| fixed::decode_i64(content, i * LONG_SIZE_IN_BYTES))
        .collect()
}

/// Appends a packed list of non-null UUIDs.
pub fn encode_uuid_list(message: &mut ClientMessage, items: &[Uuid]) {
    let mut frame = Frame::zeroed(items.len() * UUID_SIZE_IN_BYTES, DEFAULT_FLAGS);
    for (i, item) in items.iter().enumerate() {
        fixed::encode_uuid(&mut frame.content, i * UUID_SIZE_IN_BYTES, Some(*item));
    }
    message.add_frame(frame);
}

/// Reads a packed list of UUIDs; null entries are reported as protocol errors.
pub fn decode_uuid_list(reader: &mut FrameReader<'_>) -> Result<Vec<Uuid>> {
    let content = packed(reader, UUID_SIZE_IN_BYTES)?;
    (0..content.len() / UUID_SIZE_IN_BYTES)
        .map(|i| {
            fixed::decode_uuid(content, i * UUID_SIZE_IN_BYTES)?
                .ok_or_else(|| GridError::Protocol("null UUID in UUID list".to_string()))
        })
        .collect()
}

/// Appends a packed list of (i32, i64) pairs.
pub fn encode_int_long_entries(message: &mut ClientMessage, entries: &[(i32, i64)]) {
    const ENTRY: usize = INT_SIZE_IN_BYTES + LONG_SIZE_IN_BYTES;
    let mut frame = Frame::zeroed(entries.len() * ENTRY, DEFAULT_FLAGS);
    for (i, (key, value)) in entries.iter().enumerate() {
        fixed::encode_i32(&mut frame.content, i * ENTRY, *key);
        fixed::encode_i64(&mut frame.content, i * ENTRY + INT_SIZE_IN_BYTES, *value);
    }
    message.add_frame(frame);
}

/// Reads a packed list of (i32, i64) pairs.
pub fn decode_int_long_entries(reader: &mut FrameReader<'_>) -> Result<Vec<(i32, i64)>> {
    const ENTRY: usize = INT_SIZE_IN_BYTES + LONG_SIZE_IN_BYTES;
    let content = packed(reader, ENTRY)?;
    (0..content.len() / ENTRY)
        .map(|i| {
            Ok((
                fixed::decode_i32(content, i * ENTRY)?,
                fixed::decode_i64(content, i * ENTRY + INT_SIZE_IN_BYTES)?,
            ))
        })
        .collect()
}

/// Appends a packed list of (i32, UUID) pairs.
pub fn encode_int_uuid_entries(message: &mut ClientMessage, entries: &[(i32, Uuid)]) {
    const ENTRY: usize = INT_SIZE_IN_BYTES + UUID_SIZE_IN_BYTES;
    let mut frame = Frame::zeroed(entries.len() * ENTRY, DEFAULT_FLAGS);
    for (i, (key, value)) in entries.iter().enumerate() {
        fixed::encode_i32(&mut frame.content, i * ENTRY, *key);
        fixed::encode_uuid(&mut frame.content, i * ENTRY + INT_SIZE_IN_BYTES, Some(*value));
    }
    message.add_frame(frame);
}

/// Reads a packed list of (i32, UUID) pairs.
pub fn decode_int_uuid_entries(reader: &mut FrameReader<'_>) -> Result<Vec<(i32, Uuid)>> {
    const ENTRY: usize = INT_SIZE_IN_BYTES + UUID_SIZE_IN_BYTES;
    let content = packed(reader, ENTRY)?;
    (0..content.len() / ENTRY)
        .map(|i| {
            let key = fixed::decode_i32(content, i * ENTRY)?;
            let value = fixed::decode_uuid(content, i * ENTRY + INT_SIZE_IN_BYTES)?
                .ok_or_else(|| GridError::Protocol("null UUID in entry list".to_string()))?;
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> ClientMessage {
        ClientMessage::create_for_encode(1, PARTITION_ID_ANY, 0)
    }

    #[test]
    fn test_strings_and_nullables() {
        let mut msg = message();
        encode_string(&mut msg, "ncc-map");
        encode_nullable(&mut msg, None::<&str>, encode_string);
        encode_nullable(&mut msg, Some("x"), encode_string);

        let mut reader = msg.reader();
        assert_eq!(decode_string(&mut reader).unwrap(), "ncc-map");
        assert_eq!(decode_nullable(&mut reader, decode_string).unwrap(), None);
        assert_eq!(
            decode_nullable(&mut reader, decode_string).unwrap(),
            Some("x".to_string())
        );
        assert!(!reader.has_next());
    }

    #[test]
    fn test_data_frame() {
        let key = Data::of("key0").unwrap();
        let mut msg = message();
        encode_data(&mut msg, &key);
        assert_eq!(decode_data(&mut msg.reader()).unwrap(), key);
    }

    #[test]
    fn test_list_of_data() {
        let keys = vec![Data::of("a").unwrap(), Data::of("b").unwrap()];
        let mut msg = message();
        encode_list(&mut msg, &keys, encode_data);
        encode_string(&mut msg, "after");

        let mut reader = msg.reader();
        assert_eq!(decode_list(&mut reader, decode_data).unwrap(), keys);
        assert_eq!(decode_string(&mut reader).unwrap(), "after");
    }

    #[test]
    fn test_empty_list() {
        let mut msg = message();
        encode_list::<Data>(&mut msg, &[], encode_data);
        assert!(decode_list(&mut msg.reader(), decode_data).unwrap().is_empty());
    }

    #[test]
    fn test_entry_list_with_packed_values() {
        let entries = vec![
            ("map-a".to_string(), vec![(0, 1i64), (5, 9)]),
            ("map-b".to_string(), vec![]),
        ];
        let mut msg = message();
        encode_entry_list(
            &mut msg,
            &entries,
            |m, k| encode_string(m, k),
            |m, v| encode_int_long_entries(m, v),
        );

        let decoded =
            decode_entry_list(&mut msg.reader(), decode_string, decode_int_long_entries).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_packed_lists() {
        let uuids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let mut msg = message();
        encode_int_list(&mut msg, &[1, -2, 3]);
        encode_long_list(&mut msg, &[i64::MIN, 0]);
        encode_uuid_list(&mut msg, &uuids);
        encode_int_uuid_entries(&mut msg, &[(7, uuids[0])]);

        let mut reader = msg.reader();
        assert_eq!(decode_int_list(&mut reader).unwrap(), vec![1, -2, 3]);
        assert_eq!(decode_long_list(&mut reader).unwrap(), vec![i64::MIN, 0]);
        assert_eq!(decode_uuid_list(&mut reader).unwrap(), uuids);
        assert_eq!(
            decode_int_uuid_entries(&mut reader).unwrap(),
            vec![(7, uuids[0])]
        );
    }

    #[test]
    fn test_misaligned_packed_list() {
        let mut msg = message();
        encode_byte_array(&mut msg, &[1, 2, 3]);
        assert!(decode_int_list(&mut msg.reader()).is_err());
    }
}
