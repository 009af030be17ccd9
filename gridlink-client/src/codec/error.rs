//! Error responses (message type 0).
//!
//! The body is a list of error holders, outermost cause first. The client
//! surfaces the first holder as a [`ServerError`].

use gridlink_core::protocol::builtin::{
    decode_list, decode_nullable, decode_string, encode_list, encode_nullable, encode_string,
};
use gridlink_core::protocol::{fixed, ClientMessage, Frame, ERROR_MESSAGE_TYPE, INT_SIZE_IN_BYTES};
use gridlink_core::{GridError, Result, ServerError};

/// Message type of error responses.
pub const RESPONSE_MESSAGE_TYPE: i32 = ERROR_MESSAGE_TYPE;

/// Returns true if `message` is an error response.
pub fn is_error(message: &ClientMessage) -> bool {
    message.message_type() == Some(ERROR_MESSAGE_TYPE)
}

/// Builds an error response for `errors`.
pub fn encode(errors: &[ServerError]) -> ClientMessage {
    let mut message = ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, 0);
    encode_list(&mut message, errors, |message, error| {
        message.add_frame(Frame::new_begin_frame());
        let mut initial = Frame::zeroed(INT_SIZE_IN_BYTES, 0);
        fixed::encode_i32(&mut initial.content, 0, error.error_code);
        message.add_frame(initial);
        encode_string(message, &error.class_name);
        encode_nullable(message, error.message.as_deref(), encode_string);
        message.add_frame(Frame::new_end_frame());
    });
    message
}

/// Decodes every error holder of an error response.
pub fn decode(message: &ClientMessage) -> Result<Vec<ServerError>> {
    let mut reader = message.reader();
    decode_list(&mut reader, |reader| {
        reader.expect_begin()?;
        let error_code = fixed::decode_i32(&reader.next_frame()?.content, 0)?;
        let class_name = decode_string(reader)?;
        let text = decode_nullable(reader, decode_string)?;
        reader.skip_to_struct_end()?;
        Ok(ServerError::new(error_code, class_name, text))
    })
}

/// Converts an error response into the error surfaced to the caller.
pub fn to_grid_error(message: &ClientMessage) -> GridError {
    match decode(message) {
        Ok(errors) => match errors.into_iter().next() {
            Some(error) => GridError::Server(error),
            None => GridError::Protocol("error response without error holders".to_string()),
        },
        Err(e) => e,
    }
}
