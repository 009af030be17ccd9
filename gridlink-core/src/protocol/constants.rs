//! Wire-level constants of the client protocol.

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the frame flags field in bytes.
pub const SIZE_OF_FRAME_FLAGS_FIELD: usize = 2;

/// Total frame header size (length + flags). The length field covers it.
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD;

/// First fragment of a message.
pub const BEGIN_FRAGMENT_FLAG: u16 = 1 << 15;

/// Last fragment of a message.
pub const END_FRAGMENT_FLAG: u16 = 1 << 14;

/// Last frame of a message (or of a fragment).
pub const IS_FINAL_FLAG: u16 = 1 << 13;

/// Opens a nested structure.
pub const BEGIN_DATA_STRUCTURE_FLAG: u16 = 1 << 12;

/// Closes a nested structure.
pub const END_DATA_STRUCTURE_FLAG: u16 = 1 << 11;

/// Stands in for an absent nullable field.
pub const IS_NULL_FLAG: u16 = 1 << 10;

/// Marks a message pushed by a member for a listener registration.
pub const IS_EVENT_FLAG: u16 = 1 << 9;

/// Set on requests whose response may report pending backup acks.
pub const BACKUP_AWARE_FLAG: u16 = 1 << 8;

/// Marks a backup acknowledgement event.
pub const BACKUP_EVENT_FLAG: u16 = 1 << 7;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Initial-frame flags of a message that is not split into fragments.
pub const UNFRAGMENTED_MESSAGE: u16 = BEGIN_FRAGMENT_FLAG | END_FRAGMENT_FLAG;

/// Offset of message type in initial frame content.
pub const TYPE_FIELD_OFFSET: usize = 0;

/// Offset of correlation ID in initial frame content.
pub const CORRELATION_ID_OFFSET: usize = TYPE_FIELD_OFFSET + INT_SIZE_IN_BYTES;

/// Offset of partition ID in request and event initial frames.
pub const PARTITION_ID_OFFSET: usize = CORRELATION_ID_OFFSET + LONG_SIZE_IN_BYTES;

/// Size of the request initial frame header.
pub const REQUEST_HEADER_SIZE: usize = PARTITION_ID_OFFSET + INT_SIZE_IN_BYTES;

/// Size of the event initial frame header.
pub const EVENT_HEADER_SIZE: usize = REQUEST_HEADER_SIZE;

/// Offset of backup acks count in response initial frame.
pub const RESPONSE_BACKUP_ACKS_OFFSET: usize = CORRELATION_ID_OFFSET + LONG_SIZE_IN_BYTES;

/// Size of the response initial frame header.
pub const RESPONSE_HEADER_SIZE: usize = RESPONSE_BACKUP_ACKS_OFFSET + BYTE_SIZE_IN_BYTES;

/// Size of the fragmentation ID carried by the first frame of a fragment.
pub const FRAGMENTATION_ID_SIZE: usize = LONG_SIZE_IN_BYTES;

/// Partition ID indicating no specific partition (-1).
pub const PARTITION_ID_ANY: i32 = -1;

/// Message type of an error response.
pub const ERROR_MESSAGE_TYPE: i32 = 0;

/// Bytes sent once by the client right after the socket is opened.
pub const CLIENT_PROTOCOL_HEADER: &[u8; 3] = b"CP2";

/// Default upper bound on a single frame's declared length.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 128 * 1024 * 1024;

/// Encoded width of a byte.
pub const BYTE_SIZE_IN_BYTES: usize = 1;
/// Encoded width of a boolean.
pub const BOOLEAN_SIZE_IN_BYTES: usize = 1;
/// Encoded width of an i32.
pub const INT_SIZE_IN_BYTES: usize = 4;
/// Encoded width of an i64.
pub const LONG_SIZE_IN_BYTES: usize = 8;
/// A nullable UUID: one is-null byte followed by two longs.
pub const UUID_SIZE_IN_BYTES: usize = BOOLEAN_SIZE_IN_BYTES + 2 * LONG_SIZE_IN_BYTES;
