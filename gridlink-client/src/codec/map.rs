//! Distributed map operations.
//!
//! Key-based operations share one layout: fixed `thread_id` (and `ttl`, or
//! a lock `timeout`, for writes) in the initial frame, then the map name,
//! the key and, for writes, the value.

use gridlink_core::protocol::builtin::{
    decode_data, decode_nullable, decode_string, encode_data, encode_nullable, encode_string,
};
use gridlink_core::protocol::{
    fixed, ClientMessage, LONG_SIZE_IN_BYTES, PARTITION_ID_ANY, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};
use gridlink_core::{Data, GridError, Result};

use super::{expect_type, initial_content};

const THREAD_ID_OFFSET: usize = REQUEST_HEADER_SIZE;
const TTL_OFFSET: usize = THREAD_ID_OFFSET + LONG_SIZE_IN_BYTES;

/// A decoded key-based request, as seen by the member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRequest {
    /// Map name.
    pub name: String,
    /// Serialized key.
    pub key: Data,
    /// Serialized value, for writes.
    pub value: Option<Data>,
    /// Identifier of the calling thread, used for lock ownership.
    pub thread_id: i64,
    /// Time-to-live in milliseconds, for writes. Negative means the map default.
    pub ttl: Option<i64>,
}

#[allow(clippy::too_many_arguments)]
fn encode_keyed(
    message_type: i32,
    operation_name: &'static str,
    retryable: bool,
    name: &str,
    key: &Data,
    value: Option<&Data>,
    thread_id: i64,
    ttl: Option<i64>,
) -> ClientMessage {
    let fixed_size = if ttl.is_some() {
        2 * LONG_SIZE_IN_BYTES
    } else {
        LONG_SIZE_IN_BYTES
    };
    let mut message = ClientMessage::create_for_encode(message_type, PARTITION_ID_ANY, fixed_size);
    message.set_retryable(retryable);
    message.set_operation_name(operation_name);
    let content = message.initial_content_mut();
    fixed::encode_i64(content, THREAD_ID_OFFSET, thread_id);
    if let Some(ttl) = ttl {
        fixed::encode_i64(content, TTL_OFFSET, ttl);
    }

    encode_string(&mut message, name);
    encode_data(&mut message, key);
    if let Some(value) = value {
        encode_data(&mut message, value);
    }
    message
}

fn decode_keyed(
    message: &ClientMessage,
    message_type: i32,
    has_ttl: bool,
    has_value: bool,
) -> Result<KeyedRequest> {
    expect_type(message, message_type)?;
    let content = initial_content(message)?;
    let thread_id = fixed::decode_i64(content, THREAD_ID_OFFSET)?;
    let ttl = if has_ttl {
        Some(fixed::decode_i64(content, TTL_OFFSET)?)
    } else {
        None
    };

    let mut reader = message.reader();
    let name = decode_string(&mut reader)?;
    let key = decode_data(&mut reader)?;
    let value = if has_value {
        Some(decode_data(&mut reader)?)
    } else {
        None
    };
    Ok(KeyedRequest {
        name,
        key,
        value,
        thread_id,
        ttl,
    })
}

fn encode_named(
    message_type: i32,
    operation_name: &'static str,
    retryable: bool,
    name: &str,
) -> ClientMessage {
    let mut message = ClientMessage::create_for_encode(message_type, PARTITION_ID_ANY, 0);
    message.set_retryable(retryable);
    message.set_operation_name(operation_name);
    encode_string(&mut message, name);
    message
}

fn decode_named(message: &ClientMessage, message_type: i32) -> Result<String> {
    expect_type(message, message_type)?;
    decode_string(&mut message.reader())
}

fn nullable_data_response(message_type: i32, value: Option<&Data>) -> ClientMessage {
    let mut message = ClientMessage::create_for_response(message_type, 0);
    encode_nullable(&mut message, value, encode_data);
    message
}

fn decode_nullable_data_response(message: &ClientMessage, message_type: i32) -> Result<Option<Data>> {
    expect_type(message, message_type)?;
    decode_nullable(&mut message.reader(), decode_data)
}

macro_rules! nullable_data_response {
    () => {
        /// Encodes the response (member side).
        pub fn encode_response(value: Option<&Data>) -> ClientMessage {
            super::nullable_data_response(RESPONSE_MESSAGE_TYPE, value)
        }

        /// Decodes the response: the previous or current value, if any.
        pub fn decode_response(message: &ClientMessage) -> Result<Option<Data>> {
            super::decode_nullable_data_response(message, RESPONSE_MESSAGE_TYPE)
        }
    };
}

macro_rules! bool_response {
    () => {
        /// Encodes the response (member side).
        pub fn encode_response(value: bool) -> ClientMessage {
            crate::codec::bool_response(RESPONSE_MESSAGE_TYPE, value)
        }

        /// Decodes the response.
        pub fn decode_response(message: &ClientMessage) -> Result<bool> {
            crate::codec::decode_bool_response(message, RESPONSE_MESSAGE_TYPE)
        }
    };
}

macro_rules! empty_response {
    () => {
        /// Encodes the response (member side).
        pub fn encode_response() -> ClientMessage {
            ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, 0)
        }

        /// Decodes the response.
        pub fn decode_response(message: &ClientMessage) -> Result<()> {
            crate::codec::decode_empty_response(message, RESPONSE_MESSAGE_TYPE)
        }
    };
}

/// `Map.Put`: stores a value and returns the previous one.
pub mod put {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010100;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010101;
    /// Not idempotent with respect to the returned previous value.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, value: &Data, thread_id: i64, ttl: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.Put", RETRYABLE, name, key, Some(value), thread_id, Some(ttl))
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, true, true)
    }

    nullable_data_response!();
}

/// `Map.Get`: reads the value of a key.
pub mod get {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010200;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010201;
    /// Reads are idempotent.
    pub const RETRYABLE: bool = true;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, thread_id: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.Get", RETRYABLE, name, key, None, thread_id, None)
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, false, false)
    }

    nullable_data_response!();
}

/// `Map.Remove`: removes a key and returns its value.
pub mod remove {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010300;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010301;
    /// A second attempt would report no previous value.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, thread_id: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.Remove", RETRYABLE, name, key, None, thread_id, None)
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, false, false)
    }

    nullable_data_response!();
}

/// `Map.Replace`: replaces the value of an existing key.
pub mod replace {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010400;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010401;
    /// Not idempotent with respect to the returned previous value.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, value: &Data, thread_id: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.Replace", RETRYABLE, name, key, Some(value), thread_id, None)
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, false, true)
    }

    nullable_data_response!();
}

/// `Map.ReplaceIfSame`: replaces the value of a key only if it currently
/// equals an expected value.
pub mod replace_if_same {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010500;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010501;
    /// A second attempt would compare against the first one's value.
    pub const RETRYABLE: bool = false;

    /// A decoded compare-and-set request.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Request {
        /// Map name.
        pub name: String,
        /// Serialized key.
        pub key: Data,
        /// Value the key must currently map to.
        pub test_value: Data,
        /// Replacement value.
        pub value: Data,
        /// Identifier of the calling thread.
        pub thread_id: i64,
    }

    /// Encodes the request.
    pub fn encode_request(
        name: &str,
        key: &Data,
        test_value: &Data,
        value: &Data,
        thread_id: i64,
    ) -> ClientMessage {
        let mut message = encode_keyed(
            REQUEST_MESSAGE_TYPE,
            "Map.ReplaceIfSame",
            RETRYABLE,
            name,
            key,
            Some(test_value),
            thread_id,
            None,
        );
        encode_data(&mut message, value);
        message
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<Request> {
        expect_type(message, REQUEST_MESSAGE_TYPE)?;
        let thread_id = fixed::decode_i64(initial_content(message)?, THREAD_ID_OFFSET)?;
        let mut reader = message.reader();
        Ok(Request {
            name: decode_string(&mut reader)?,
            key: decode_data(&mut reader)?,
            test_value: decode_data(&mut reader)?,
            value: decode_data(&mut reader)?,
            thread_id,
        })
    }

    bool_response!();
}

/// `Map.ContainsKey`: checks whether a key is present.
pub mod contains_key {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010600;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010601;
    /// Reads are idempotent.
    pub const RETRYABLE: bool = true;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, thread_id: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.ContainsKey", RETRYABLE, name, key, None, thread_id, None)
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, false, false)
    }

    bool_response!();
}

/// `Map.Delete`: removes a key without returning its value.
pub mod delete {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010900;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010901;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, thread_id: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.Delete", RETRYABLE, name, key, None, thread_id, None)
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, false, false)
    }

    empty_response!();
}

/// `Map.TryRemove`: removes a key, waiting at most `timeout` for its lock.
pub mod try_remove {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010B00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010B01;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    /// Encodes the request. `timeout` is in milliseconds.
    pub fn encode_request(name: &str, key: &Data, thread_id: i64, timeout: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.TryRemove", RETRYABLE, name, key, None, thread_id, Some(timeout))
    }

    /// Decodes the request (member side): the request and the timeout.
    pub fn decode_request(message: &ClientMessage) -> Result<(KeyedRequest, i64)> {
        let request = decode_keyed(message, REQUEST_MESSAGE_TYPE, false, false)?;
        let timeout = fixed::decode_i64(initial_content(message)?, TTL_OFFSET)?;
        Ok((request, timeout))
    }

    bool_response!();
}

/// `Map.TryPut`: stores a value, waiting at most `timeout` for the key's lock.
pub mod try_put {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010C00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010C01;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    /// Encodes the request. `timeout` is in milliseconds.
    pub fn encode_request(name: &str, key: &Data, value: &Data, thread_id: i64, timeout: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.TryPut", RETRYABLE, name, key, Some(value), thread_id, Some(timeout))
    }

    /// Decodes the request (member side): the request and the timeout.
    pub fn decode_request(message: &ClientMessage) -> Result<(KeyedRequest, i64)> {
        let request = decode_keyed(message, REQUEST_MESSAGE_TYPE, false, true)?;
        let timeout = fixed::decode_i64(initial_content(message)?, TTL_OFFSET)?;
        Ok((request, timeout))
    }

    bool_response!();
}

/// `Map.PutTransient`: stores a value that is never written to a backing store.
pub mod put_transient {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010D00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010D01;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, value: &Data, thread_id: i64, ttl: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.PutTransient", RETRYABLE, name, key, Some(value), thread_id, Some(ttl))
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, true, true)
    }

    empty_response!();
}

/// `Map.PutIfAbsent`: stores a value unless the key is present.
pub mod put_if_absent {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010E00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010E01;
    /// A second attempt would observe the first one's value.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, value: &Data, thread_id: i64, ttl: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.PutIfAbsent", RETRYABLE, name, key, Some(value), thread_id, Some(ttl))
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, true, true)
    }

    nullable_data_response!();
}

/// `Map.Set`: stores a value without returning the previous one.
pub mod set {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x010F00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x010F01;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, value: &Data, thread_id: i64, ttl: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.Set", RETRYABLE, name, key, Some(value), thread_id, Some(ttl))
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, true, true)
    }

    empty_response!();
}

/// `Map.RemoveEntryListener`: cancels a subscription.
pub mod remove_entry_listener {
    use gridlink_core::protocol::UUID_SIZE_IN_BYTES;
    use uuid::Uuid;

    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x011A00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x011A01;
    /// Removing a subscription twice is harmless.
    pub const RETRYABLE: bool = true;

    const REGISTRATION_ID_OFFSET: usize = REQUEST_HEADER_SIZE;

    /// Encodes the request.
    pub fn encode_request(name: &str, registration_id: Uuid) -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(
            REQUEST_MESSAGE_TYPE,
            PARTITION_ID_ANY,
            UUID_SIZE_IN_BYTES,
        );
        message.set_retryable(RETRYABLE);
        message.set_operation_name("Map.RemoveEntryListener");
        fixed::encode_uuid(
            message.initial_content_mut(),
            REGISTRATION_ID_OFFSET,
            Some(registration_id),
        );
        encode_string(&mut message, name);
        message
    }

    /// Decodes the request (member side): map name and registration ID.
    pub fn decode_request(message: &ClientMessage) -> Result<(String, Uuid)> {
        expect_type(message, REQUEST_MESSAGE_TYPE)?;
        let registration_id = fixed::decode_uuid(initial_content(message)?, REGISTRATION_ID_OFFSET)?
            .ok_or_else(|| GridError::Protocol("missing registration ID".to_string()))?;
        let name = decode_string(&mut message.reader())?;
        Ok((name, registration_id))
    }

    bool_response!();
}

/// `Map.Evict`: drops a key from the member's memory without a remove.
pub mod evict {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x011E00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x011E01;
    /// Reported result differs on a second attempt.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str, key: &Data, thread_id: i64) -> ClientMessage {
        encode_keyed(REQUEST_MESSAGE_TYPE, "Map.Evict", RETRYABLE, name, key, None, thread_id, None)
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<KeyedRequest> {
        decode_keyed(message, REQUEST_MESSAGE_TYPE, false, false)
    }

    bool_response!();
}

/// `Map.EvictAll`: evicts every key of the map.
pub mod evict_all {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x011F00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x011F01;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str) -> ClientMessage {
        encode_named(REQUEST_MESSAGE_TYPE, "Map.EvictAll", RETRYABLE, name)
    }

    /// Decodes the request (member side): the map name.
    pub fn decode_request(message: &ClientMessage) -> Result<String> {
        decode_named(message, REQUEST_MESSAGE_TYPE)
    }

    empty_response!();
}

/// `Map.GetAll`: reads the values of several keys owned by one partition.
pub mod get_all {
    use gridlink_core::protocol::builtin::{decode_entry_list, decode_list, encode_entry_list, encode_list};

    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x012300;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x012301;
    /// Reads are idempotent.
    pub const RETRYABLE: bool = true;

    /// Encodes the request.
    pub fn encode_request(name: &str, keys: &[Data]) -> ClientMessage {
        let mut message = encode_named(REQUEST_MESSAGE_TYPE, "Map.GetAll", RETRYABLE, name);
        encode_list(&mut message, keys, |m, key| encode_data(m, key));
        message
    }

    /// Decodes the request (member side): map name and keys.
    pub fn decode_request(message: &ClientMessage) -> Result<(String, Vec<Data>)> {
        expect_type(message, REQUEST_MESSAGE_TYPE)?;
        let mut reader = message.reader();
        let name = decode_string(&mut reader)?;
        let keys = decode_list(&mut reader, decode_data)?;
        Ok((name, keys))
    }

    /// Encodes the response (member side). Keys without a value are left out.
    pub fn encode_response(entries: &[(Data, Data)]) -> ClientMessage {
        let mut message = ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, 0);
        encode_entry_list(
            &mut message,
            entries,
            |m, key| encode_data(m, key),
            |m, value| encode_data(m, value),
        );
        message
    }

    /// Decodes the response: the entries found.
    pub fn decode_response(message: &ClientMessage) -> Result<Vec<(Data, Data)>> {
        expect_type(message, RESPONSE_MESSAGE_TYPE)?;
        decode_entry_list(&mut message.reader(), decode_data, decode_data)
    }
}

/// `Map.Size`: counts the entries of the map.
pub mod size {
    use gridlink_core::protocol::INT_SIZE_IN_BYTES;

    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x012A00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x012A01;
    /// Reads are idempotent.
    pub const RETRYABLE: bool = true;

    /// Encodes the request.
    pub fn encode_request(name: &str) -> ClientMessage {
        encode_named(REQUEST_MESSAGE_TYPE, "Map.Size", RETRYABLE, name)
    }

    /// Decodes the request (member side): the map name.
    pub fn decode_request(message: &ClientMessage) -> Result<String> {
        decode_named(message, REQUEST_MESSAGE_TYPE)
    }

    /// Encodes the response (member side).
    pub fn encode_response(size: i32) -> ClientMessage {
        let mut message = ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, INT_SIZE_IN_BYTES);
        fixed::encode_i32(message.initial_content_mut(), RESPONSE_HEADER_SIZE, size);
        message
    }

    /// Decodes the response.
    pub fn decode_response(message: &ClientMessage) -> Result<i32> {
        expect_type(message, RESPONSE_MESSAGE_TYPE)?;
        fixed::decode_i32(initial_content(message)?, RESPONSE_HEADER_SIZE)
    }
}

/// `Map.PutAll`: stores several entries owned by one partition.
pub mod put_all {
    use gridlink_core::protocol::builtin::{decode_entry_list, encode_entry_list};
    use gridlink_core::protocol::BOOLEAN_SIZE_IN_BYTES;

    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x012C00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x012C01;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    const TRIGGER_MAP_LOADER_OFFSET: usize = REQUEST_HEADER_SIZE;

    /// Encodes the request.
    ///
    /// `trigger_map_loader` asks the member to load missing keys from the
    /// backing store first, so replaced values can be reported to listeners.
    pub fn encode_request(name: &str, entries: &[(Data, Data)], trigger_map_loader: bool) -> ClientMessage {
        let mut message =
            ClientMessage::create_for_encode(REQUEST_MESSAGE_TYPE, PARTITION_ID_ANY, BOOLEAN_SIZE_IN_BYTES);
        message.set_retryable(RETRYABLE);
        message.set_operation_name("Map.PutAll");
        fixed::encode_bool(message.initial_content_mut(), TRIGGER_MAP_LOADER_OFFSET, trigger_map_loader);
        encode_string(&mut message, name);
        encode_entry_list(
            &mut message,
            entries,
            |m, key| encode_data(m, key),
            |m, value| encode_data(m, value),
        );
        message
    }

    /// Decodes the request (member side): name, entries and the loader flag.
    pub fn decode_request(message: &ClientMessage) -> Result<(String, Vec<(Data, Data)>, bool)> {
        expect_type(message, REQUEST_MESSAGE_TYPE)?;
        let trigger_map_loader = fixed::decode_bool(initial_content(message)?, TRIGGER_MAP_LOADER_OFFSET)?;
        let mut reader = message.reader();
        let name = decode_string(&mut reader)?;
        let entries = decode_entry_list(&mut reader, decode_data, decode_data)?;
        Ok((name, entries, trigger_map_loader))
    }

    empty_response!();
}

/// `Map.Clear`: removes every entry of the map.
pub mod clear {
    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x012D00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x012D01;
    /// Mutations are not retried unless redo is enabled.
    pub const RETRYABLE: bool = false;

    /// Encodes the request.
    pub fn encode_request(name: &str) -> ClientMessage {
        encode_named(REQUEST_MESSAGE_TYPE, "Map.Clear", RETRYABLE, name)
    }

    /// Decodes the request (member side): the map name.
    pub fn decode_request(message: &ClientMessage) -> Result<String> {
        decode_named(message, REQUEST_MESSAGE_TYPE)
    }

    empty_response!();
}

/// `Map.FetchNearCacheInvalidationMetadata`: reads the invalidation
/// sequences and partition UUIDs a member holds for the given maps.
pub mod fetch_near_cache_invalidation_metadata {
    use gridlink_core::protocol::builtin::{
        decode_entry_list, decode_int_long_entries, decode_int_uuid_entries, decode_list,
        encode_entry_list, encode_int_long_entries, encode_int_uuid_entries, encode_list,
    };
    use gridlink_core::protocol::UUID_SIZE_IN_BYTES;
    use uuid::Uuid;

    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x013D00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x013D01;
    /// Reads are idempotent.
    pub const RETRYABLE: bool = true;

    const MEMBER_UUID_OFFSET: usize = REQUEST_HEADER_SIZE;

    /// Invalidation state reported by one member.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Response {
        /// Per map name, the last invalidation sequence of each partition.
        pub name_partition_sequences: Vec<(String, Vec<(i32, i64)>)>,
        /// Current UUID epoch of each partition the member owns.
        pub partition_uuids: Vec<(i32, Uuid)>,
    }

    /// Encodes the request.
    pub fn encode_request(names: &[String], member_uuid: Uuid) -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(
            REQUEST_MESSAGE_TYPE,
            PARTITION_ID_ANY,
            UUID_SIZE_IN_BYTES,
        );
        message.set_retryable(RETRYABLE);
        message.set_operation_name("Map.FetchNearCacheInvalidationMetadata");
        fixed::encode_uuid(message.initial_content_mut(), MEMBER_UUID_OFFSET, Some(member_uuid));
        encode_list(&mut message, names, |m, name| encode_string(m, name));
        message
    }

    /// Decodes the request (member side): map names and the addressed member.
    pub fn decode_request(message: &ClientMessage) -> Result<(Vec<String>, Uuid)> {
        expect_type(message, REQUEST_MESSAGE_TYPE)?;
        let member_uuid = fixed::decode_uuid(initial_content(message)?, MEMBER_UUID_OFFSET)?
            .ok_or_else(|| GridError::Protocol("missing member UUID".to_string()))?;
        let names = decode_list(&mut message.reader(), decode_string)?;
        Ok((names, member_uuid))
    }

    /// Encodes the response (member side).
    pub fn encode_response(response: &Response) -> ClientMessage {
        let mut message = ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, 0);
        encode_entry_list(
            &mut message,
            &response.name_partition_sequences,
            |m, name| encode_string(m, name),
            |m, entries| encode_int_long_entries(m, entries),
        );
        encode_int_uuid_entries(&mut message, &response.partition_uuids);
        message
    }

    /// Decodes the response.
    pub fn decode_response(message: &ClientMessage) -> Result<Response> {
        expect_type(message, RESPONSE_MESSAGE_TYPE)?;
        let mut reader = message.reader();
        Ok(Response {
            name_partition_sequences: decode_entry_list(
                &mut reader,
                decode_string,
                decode_int_long_entries,
            )?,
            partition_uuids: decode_int_uuid_entries(&mut reader)?,
        })
    }
}

/// `Map.AddNearCacheInvalidationListener`: subscribes to invalidations of
/// a map's keys.
pub mod add_near_cache_invalidation_listener {
    use gridlink_core::protocol::builtin::{
        decode_list, decode_long_list, decode_uuid_list, encode_list, encode_long_list,
        encode_uuid_list,
    };
    use gridlink_core::protocol::{BOOLEAN_SIZE_IN_BYTES, INT_SIZE_IN_BYTES, UUID_SIZE_IN_BYTES};
    use uuid::Uuid;

    use super::*;

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x013F00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x013F01;
    /// Single-key invalidation event type.
    pub const EVENT_IMAP_INVALIDATION_MESSAGE_TYPE: i32 = 0x013F02;
    /// Batched invalidation event type.
    pub const EVENT_IMAP_BATCH_INVALIDATION_MESSAGE_TYPE: i32 = 0x013F03;
    /// Registering twice would duplicate the subscription.
    pub const RETRYABLE: bool = false;

    /// Listener flags selecting invalidation events.
    pub const INVALIDATION_LISTENER_FLAGS: i32 = 1 << 8;

    const LISTENER_FLAGS_OFFSET: usize = REQUEST_HEADER_SIZE;
    const LOCAL_ONLY_OFFSET: usize = LISTENER_FLAGS_OFFSET + INT_SIZE_IN_BYTES;
    const REGISTRATION_ID_OFFSET: usize = RESPONSE_HEADER_SIZE;
    const SOURCE_UUID_OFFSET: usize = REQUEST_HEADER_SIZE;
    const PARTITION_UUID_OFFSET: usize = SOURCE_UUID_OFFSET + UUID_SIZE_IN_BYTES;
    const SEQUENCE_OFFSET: usize = PARTITION_UUID_OFFSET + UUID_SIZE_IN_BYTES;

    /// One key invalidation carried by an event.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invalidation {
        /// Invalidated key. `None` invalidates the whole map.
        pub key: Option<Data>,
        /// Client that caused the change, if the change came from a client.
        pub source_uuid: Option<Uuid>,
        /// UUID epoch of the key's partition.
        pub partition_uuid: Uuid,
        /// Invalidation sequence within the partition.
        pub sequence: i64,
    }

    /// Encodes the request.
    pub fn encode_request(name: &str, listener_flags: i32, local_only: bool) -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(
            REQUEST_MESSAGE_TYPE,
            PARTITION_ID_ANY,
            INT_SIZE_IN_BYTES + BOOLEAN_SIZE_IN_BYTES,
        );
        message.set_retryable(RETRYABLE);
        message.set_operation_name("Map.AddNearCacheInvalidationListener");
        let content = message.initial_content_mut();
        fixed::encode_i32(content, LISTENER_FLAGS_OFFSET, listener_flags);
        fixed::encode_bool(content, LOCAL_ONLY_OFFSET, local_only);
        encode_string(&mut message, name);
        message
    }

    /// Decodes the request (member side): map name, flags and local-only.
    pub fn decode_request(message: &ClientMessage) -> Result<(String, i32, bool)> {
        expect_type(message, REQUEST_MESSAGE_TYPE)?;
        let content = initial_content(message)?;
        let flags = fixed::decode_i32(content, LISTENER_FLAGS_OFFSET)?;
        let local_only = fixed::decode_bool(content, LOCAL_ONLY_OFFSET)?;
        let name = decode_string(&mut message.reader())?;
        Ok((name, flags, local_only))
    }

    /// Encodes the response (member side).
    pub fn encode_response(registration_id: Uuid) -> ClientMessage {
        let mut message = ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, UUID_SIZE_IN_BYTES);
        fixed::encode_uuid(
            message.initial_content_mut(),
            REGISTRATION_ID_OFFSET,
            Some(registration_id),
        );
        message
    }

    /// Decodes the response: the member-assigned registration ID.
    pub fn decode_response(message: &ClientMessage) -> Result<Uuid> {
        expect_type(message, RESPONSE_MESSAGE_TYPE)?;
        fixed::decode_uuid(initial_content(message)?, REGISTRATION_ID_OFFSET)?
            .ok_or_else(|| GridError::Protocol("missing registration ID".to_string()))
    }

    /// Encodes a single-key invalidation event (member side).
    pub fn encode_invalidation_event(
        partition_id: i32,
        invalidation: &Invalidation,
    ) -> ClientMessage {
        let mut message = ClientMessage::create_for_event(
            EVENT_IMAP_INVALIDATION_MESSAGE_TYPE,
            partition_id,
            2 * UUID_SIZE_IN_BYTES + LONG_SIZE_IN_BYTES,
        );
        let content = message.initial_content_mut();
        fixed::encode_uuid(content, SOURCE_UUID_OFFSET, invalidation.source_uuid);
        fixed::encode_uuid(content, PARTITION_UUID_OFFSET, Some(invalidation.partition_uuid));
        fixed::encode_i64(content, SEQUENCE_OFFSET, invalidation.sequence);
        encode_nullable(&mut message, invalidation.key.as_ref(), encode_data);
        message
    }

    /// Encodes a batched invalidation event (member side).
    ///
    /// Batches carry keys only; every invalidation must have one.
    pub fn encode_batch_invalidation_event(invalidations: &[Invalidation]) -> ClientMessage {
        let mut message = ClientMessage::create_for_event(
            EVENT_IMAP_BATCH_INVALIDATION_MESSAGE_TYPE,
            PARTITION_ID_ANY,
            0,
        );
        let keys: Vec<&Data> = invalidations.iter().filter_map(|i| i.key.as_ref()).collect();
        let sources: Vec<Uuid> = invalidations
            .iter()
            .map(|i| i.source_uuid.unwrap_or_else(Uuid::nil))
            .collect();
        let partition_uuids: Vec<Uuid> = invalidations.iter().map(|i| i.partition_uuid).collect();
        let sequences: Vec<i64> = invalidations.iter().map(|i| i.sequence).collect();

        encode_list(&mut message, &keys, |m, key| encode_data(m, key));
        encode_uuid_list(&mut message, &sources);
        encode_uuid_list(&mut message, &partition_uuids);
        encode_long_list(&mut message, &sequences);
        message
    }

    /// Decodes either invalidation event into its invalidations.
    pub fn decode_event(message: &ClientMessage) -> Result<Vec<Invalidation>> {
        match message.message_type() {
            Some(EVENT_IMAP_INVALIDATION_MESSAGE_TYPE) => {
                let content = initial_content(message)?;
                let partition_uuid = fixed::decode_uuid(content, PARTITION_UUID_OFFSET)?
                    .ok_or_else(|| GridError::Protocol("missing partition UUID".to_string()))?;
                Ok(vec![Invalidation {
                    key: decode_nullable(&mut message.reader(), decode_data)?,
                    source_uuid: fixed::decode_uuid(content, SOURCE_UUID_OFFSET)?,
                    partition_uuid,
                    sequence: fixed::decode_i64(content, SEQUENCE_OFFSET)?,
                }])
            }
            Some(EVENT_IMAP_BATCH_INVALIDATION_MESSAGE_TYPE) => {
                let mut reader = message.reader();
                let keys = decode_list(&mut reader, decode_data)?;
                let sources = decode_uuid_list(&mut reader)?;
                let partition_uuids = decode_uuid_list(&mut reader)?;
                let sequences = decode_long_list(&mut reader)?;
                if sources.len() != keys.len()
                    || partition_uuids.len() != keys.len()
                    || sequences.len() != keys.len()
                {
                    return Err(GridError::Protocol(
                        "batch invalidation lists differ in length".to_string(),
                    ));
                }

                Ok(keys
                    .into_iter()
                    .zip(sources)
                    .zip(partition_uuids)
                    .zip(sequences)
                    .map(|(((key, source), partition_uuid), sequence)| Invalidation {
                        key: Some(key),
                        source_uuid: (!source.is_nil()).then_some(source),
                        partition_uuid,
                        sequence,
                    })
                    .collect())
            }
            other => Err(GridError::Protocol(format!(
                "unexpected invalidation event type {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::add_near_cache_invalidation_listener::{self as invalidation, Invalidation};
    use super::*;
    use uuid::Uuid;

    fn key(s: &str) -> Data {
        Data::of(s).unwrap()
    }

    #[test]
    fn test_put_request() {
        let message = put::encode_request("m", &key("k"), &key("v"), 7, -1);

        assert!(!message.is_retryable());
        assert_eq!(message.operation_name(), "Map.Put");
        let decoded = put::decode_request(&message).unwrap();
        assert_eq!(decoded.name, "m");
        assert_eq!(decoded.key, key("k"));
        assert_eq!(decoded.value, Some(key("v")));
        assert_eq!(decoded.thread_id, 7);
        assert_eq!(decoded.ttl, Some(-1));
    }

    #[test]
    fn test_get_request_and_response() {
        let message = get::encode_request("m", &key("k"), 1);
        assert!(message.is_retryable());
        let decoded = get::decode_request(&message).unwrap();
        assert_eq!(decoded.value, None);
        assert_eq!(decoded.ttl, None);

        let value = key("v");
        assert_eq!(get::decode_response(&get::encode_response(Some(&value))).unwrap(), Some(value));
        assert_eq!(get::decode_response(&get::encode_response(None)).unwrap(), None);
    }

    #[test]
    fn test_response_type_mismatch() {
        let response = remove::encode_response(None);
        assert!(get::decode_response(&response).is_err());
    }

    #[test]
    fn test_request_decoded_as_other_operation_fails() {
        let message = delete::encode_request("m", &key("k"), 1);
        assert!(remove::decode_request(&message).is_err());
        assert!(delete::decode_request(&message).is_ok());
    }

    #[test]
    fn test_replace_if_same_request() {
        let message = replace_if_same::encode_request("m", &key("k"), &key("old"), &key("new"), 3);
        assert!(!message.is_retryable());
        assert_eq!(
            replace_if_same::decode_request(&message).unwrap(),
            replace_if_same::Request {
                name: "m".to_string(),
                key: key("k"),
                test_value: key("old"),
                value: key("new"),
                thread_id: 3,
            }
        );
        assert!(replace_if_same::decode_response(&replace_if_same::encode_response(true)).unwrap());
    }

    #[test]
    fn test_try_operations_carry_timeout() {
        let message = try_put::encode_request("m", &key("k"), &key("v"), 1, 250);
        let (request, timeout) = try_put::decode_request(&message).unwrap();
        assert_eq!(request.value, Some(key("v")));
        assert_eq!(request.ttl, None);
        assert_eq!(timeout, 250);

        let message = try_remove::encode_request("m", &key("k"), 1, 500);
        let (request, timeout) = try_remove::decode_request(&message).unwrap();
        assert_eq!(request.key, key("k"));
        assert_eq!(request.value, None);
        assert_eq!(timeout, 500);
        assert!(try_put::decode_request(&message).is_err());
    }

    #[test]
    fn test_put_transient_request() {
        let message = put_transient::encode_request("m", &key("k"), &key("v"), 1, 1000);
        assert_eq!(message.operation_name(), "Map.PutTransient");
        let decoded = put_transient::decode_request(&message).unwrap();
        assert_eq!(decoded.ttl, Some(1000));
        assert!(put_transient::decode_response(&put_transient::encode_response()).is_ok());
    }

    #[test]
    fn test_get_all() {
        let keys = vec![key("a"), key("b")];
        let message = get_all::encode_request("m", &keys);
        assert!(message.is_retryable());
        assert_eq!(get_all::decode_request(&message).unwrap(), ("m".to_string(), keys));

        let entries = vec![(key("a"), key("1"))];
        let response = get_all::encode_response(&entries);
        assert_eq!(get_all::decode_response(&response).unwrap(), entries);
        assert!(get_all::decode_response(&get_all::encode_response(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_put_all() {
        let entries = vec![(key("a"), key("1")), (key("b"), key("2"))];
        let message = put_all::encode_request("m", &entries, false);
        assert!(!message.is_retryable());
        assert_eq!(
            put_all::decode_request(&message).unwrap(),
            ("m".to_string(), entries, false)
        );
    }

    #[test]
    fn test_named_operations() {
        let message = size::encode_request("m");
        assert_eq!(size::decode_request(&message).unwrap(), "m");
        assert_eq!(size::decode_response(&size::encode_response(42)).unwrap(), 42);

        assert_eq!(clear::decode_request(&clear::encode_request("m")).unwrap(), "m");
        assert!(clear::decode_response(&clear::encode_response()).is_ok());
        assert_eq!(evict_all::decode_request(&evict_all::encode_request("m")).unwrap(), "m");
    }

    #[test]
    fn test_contains_key_response() {
        let response = contains_key::encode_response(true);
        assert!(contains_key::decode_response(&response).unwrap());
    }

    #[test]
    fn test_remove_entry_listener() {
        let id = Uuid::new_v4();
        let message = remove_entry_listener::encode_request("m", id);
        assert_eq!(
            remove_entry_listener::decode_request(&message).unwrap(),
            ("m".to_string(), id)
        );
    }

    #[test]
    fn test_fetch_metadata() {
        let member = Uuid::new_v4();
        let names = vec!["a".to_string(), "b".to_string()];
        let message = fetch_near_cache_invalidation_metadata::encode_request(&names, member);
        assert_eq!(
            fetch_near_cache_invalidation_metadata::decode_request(&message).unwrap(),
            (names, member)
        );

        let response = fetch_near_cache_invalidation_metadata::Response {
            name_partition_sequences: vec![("a".to_string(), vec![(0, 5), (1, 9)])],
            partition_uuids: vec![(0, Uuid::new_v4()), (1, Uuid::new_v4())],
        };
        let encoded = fetch_near_cache_invalidation_metadata::encode_response(&response);
        assert_eq!(
            fetch_near_cache_invalidation_metadata::decode_response(&encoded).unwrap(),
            response
        );
    }

    #[test]
    fn test_add_invalidation_listener() {
        let message = invalidation::encode_request("m", invalidation::INVALIDATION_LISTENER_FLAGS, false);
        assert_eq!(
            invalidation::decode_request(&message).unwrap(),
            ("m".to_string(), invalidation::INVALIDATION_LISTENER_FLAGS, false)
        );

        let id = Uuid::new_v4();
        assert_eq!(invalidation::decode_response(&invalidation::encode_response(id)).unwrap(), id);
    }

    #[test]
    fn test_single_invalidation_event() {
        let event = Invalidation {
            key: Some(key("k")),
            source_uuid: Some(Uuid::new_v4()),
            partition_uuid: Uuid::new_v4(),
            sequence: 12,
        };
        let message = invalidation::encode_invalidation_event(3, &event);

        assert!(message.is_event());
        assert_eq!(message.partition_id(), Some(3));
        assert_eq!(invalidation::decode_event(&message).unwrap(), vec![event]);
    }

    #[test]
    fn test_clear_all_invalidation_event() {
        let event = Invalidation {
            key: None,
            source_uuid: None,
            partition_uuid: Uuid::new_v4(),
            sequence: 1,
        };
        let message = invalidation::encode_invalidation_event(-1, &event);
        assert_eq!(invalidation::decode_event(&message).unwrap(), vec![event]);
    }

    #[test]
    fn test_batch_invalidation_event() {
        let partition_uuid = Uuid::new_v4();
        let events: Vec<Invalidation> = (0..3)
            .map(|i| Invalidation {
                key: Some(key(&format!("k{}", i))),
                source_uuid: None,
                partition_uuid,
                sequence: i,
            })
            .collect();
        let message = invalidation::encode_batch_invalidation_event(&events);

        assert_eq!(invalidation::decode_event(&message).unwrap(), events);
    }

    #[test]
    fn test_unexpected_event_type() {
        let message = get::encode_response(None);
        assert!(invalidation::decode_event(&message).is_err());
    }
}
