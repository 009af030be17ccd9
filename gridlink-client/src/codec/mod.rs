//! Per-operation request/response codecs.
//!
//! Every operation lives in its own module exposing `REQUEST_MESSAGE_TYPE`,
//! `RESPONSE_MESSAGE_TYPE`, `RETRYABLE` and the encode/decode pair for each
//! direction. The member-side halves (`decode_request`, `encode_response`)
//! are what the in-process test member speaks.
//!
//! Codecs hold no state. Requests are created with `PARTITION_ID_ANY`; the
//! invocation layer stamps the routed partition before sending.

pub mod client;
pub mod custom;
pub mod error;
pub mod map;

use gridlink_core::protocol::{fixed, ClientMessage, RESPONSE_HEADER_SIZE};
use gridlink_core::{GridError, Result};

/// Returns the initial frame content of a message, failing on an empty message.
pub(crate) fn initial_content(message: &ClientMessage) -> Result<&[u8]> {
    message
        .initial_frame()
        .map(|f| &f.content[..])
        .ok_or_else(|| GridError::Protocol("message has no initial frame".to_string()))
}

/// Fails unless `message` carries the expected message type.
pub(crate) fn expect_type(message: &ClientMessage, expected: i32) -> Result<()> {
    match message.message_type() {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(GridError::Protocol(format!(
            "expected message type 0x{:06X}, got 0x{:06X}",
            expected, actual
        ))),
        None => Err(GridError::Protocol("message has no type".to_string())),
    }
}

/// Builds a response carrying only a boolean.
pub(crate) fn bool_response(message_type: i32, value: bool) -> ClientMessage {
    let mut message = ClientMessage::create_for_response(message_type, 1);
    fixed::encode_bool(message.initial_content_mut(), RESPONSE_HEADER_SIZE, value);
    message
}

/// Reads the boolean of a response built by [`bool_response`].
pub(crate) fn decode_bool_response(message: &ClientMessage, message_type: i32) -> Result<bool> {
    expect_type(message, message_type)?;
    fixed::decode_bool(initial_content(message)?, RESPONSE_HEADER_SIZE)
}

/// Reads the request of a response-less operation.
pub(crate) fn decode_empty_response(message: &ClientMessage, message_type: i32) -> Result<()> {
    expect_type(message, message_type)
}
