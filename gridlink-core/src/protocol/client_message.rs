//! Multi-frame client messages.

use bytes::BytesMut;

use super::constants::*;
use super::fixed;
use super::frame::Frame;
use super::reader::FrameReader;

/// A client message composed of one or more frames.
///
/// The first frame is the "initial frame" containing the message header
/// (type, correlation ID, and partition ID for requests and events, or the
/// backup-ack count for responses) followed by the operation's fixed-size
/// fields. Additional frames carry variable-size fields.
///
/// Correlation IDs are not assigned here; the invocation layer owns the
/// counter and stamps each attempt before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    frames: Vec<Frame>,
    retryable: bool,
    operation_name: &'static str,
}

impl ClientMessage {
    /// Creates a message from received frames.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            retryable: false,
            operation_name: "",
        }
    }

    fn with_initial_frame(initial: Frame) -> Self {
        Self::from_frames(vec![initial])
    }

    /// Creates a request whose initial frame has room for `fixed_size`
    /// bytes of operation fields after the request header.
    pub fn create_for_encode(message_type: i32, partition_id: i32, fixed_size: usize) -> Self {
        let mut initial = Frame::zeroed(REQUEST_HEADER_SIZE + fixed_size, UNFRAGMENTED_MESSAGE);
        fixed::encode_i32(&mut initial.content, TYPE_FIELD_OFFSET, message_type);
        fixed::encode_i32(&mut initial.content, PARTITION_ID_OFFSET, partition_id);
        Self::with_initial_frame(initial)
    }

    /// Creates a response whose initial frame has room for `fixed_size`
    /// bytes of response fields after the response header.
    pub fn create_for_response(message_type: i32, fixed_size: usize) -> Self {
        let mut initial = Frame::zeroed(RESPONSE_HEADER_SIZE + fixed_size, UNFRAGMENTED_MESSAGE);
        fixed::encode_i32(&mut initial.content, TYPE_FIELD_OFFSET, message_type);
        Self::with_initial_frame(initial)
    }

    /// Creates an event message with room for `fixed_size` bytes of event fields.
    pub fn create_for_event(message_type: i32, partition_id: i32, fixed_size: usize) -> Self {
        let mut initial = Frame::zeroed(
            EVENT_HEADER_SIZE + fixed_size,
            UNFRAGMENTED_MESSAGE | IS_EVENT_FLAG,
        );
        fixed::encode_i32(&mut initial.content, TYPE_FIELD_OFFSET, message_type);
        fixed::encode_i32(&mut initial.content, PARTITION_ID_OFFSET, partition_id);
        Self::with_initial_frame(initial)
    }

    fn header_i32(&self, offset: usize) -> Option<i32> {
        self.frames
            .first()
            .and_then(|f| fixed::decode_i32(&f.content, offset).ok())
    }

    /// Returns the message type from the initial frame.
    ///
    /// Returns `None` if there is no initial frame or if it is too short.
    pub fn message_type(&self) -> Option<i32> {
        self.header_i32(TYPE_FIELD_OFFSET)
    }

    /// Returns the correlation ID from the initial frame.
    pub fn correlation_id(&self) -> Option<i64> {
        self.frames
            .first()
            .and_then(|f| fixed::decode_i64(&f.content, CORRELATION_ID_OFFSET).ok())
    }

    /// Sets the correlation ID in the initial frame.
    pub fn set_correlation_id(&mut self, correlation_id: i64) {
        if let Some(frame) = self.frames.first_mut() {
            if frame.content.len() >= CORRELATION_ID_OFFSET + LONG_SIZE_IN_BYTES {
                fixed::encode_i64(&mut frame.content, CORRELATION_ID_OFFSET, correlation_id);
            }
        }
    }

    /// Returns the partition ID of a request or event.
    pub fn partition_id(&self) -> Option<i32> {
        self.header_i32(PARTITION_ID_OFFSET)
    }

    /// Sets the partition ID of a request.
    pub fn set_partition_id(&mut self, partition_id: i32) {
        if let Some(frame) = self.frames.first_mut() {
            if frame.content.len() >= PARTITION_ID_OFFSET + INT_SIZE_IN_BYTES {
                fixed::encode_i32(&mut frame.content, PARTITION_ID_OFFSET, partition_id);
            }
        }
    }

    /// Returns the number of backups a response says are still pending.
    pub fn backup_acks(&self) -> Option<u8> {
        self.frames
            .first()
            .and_then(|f| fixed::decode_u8(&f.content, RESPONSE_BACKUP_ACKS_OFFSET).ok())
    }

    /// Returns true if the operation may be sent again after a failure.
    ///
    /// This is a property of the operation, set by its codec. It never
    /// travels on the wire.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Marks whether the operation may be sent again after a failure.
    pub fn set_retryable(&mut self, retryable: bool) {
        self.retryable = retryable;
    }

    /// Operation name used in logs.
    pub fn operation_name(&self) -> &'static str {
        self.operation_name
    }

    /// Sets the operation name used in logs.
    pub fn set_operation_name(&mut self, name: &'static str) {
        self.operation_name = name;
    }

    /// Returns true if this message is flagged as an event.
    pub fn is_event(&self) -> bool {
        self.frames
            .first()
            .map(|f| f.is_event_frame())
            .unwrap_or(false)
    }

    /// Returns true if this message is a backup acknowledgement event.
    pub fn is_backup_event(&self) -> bool {
        self.frames
            .first()
            .map(|f| f.is_backup_event_frame())
            .unwrap_or(false)
    }

    /// Adds a frame to the message.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Returns the initial (first) frame, if present.
    pub fn initial_frame(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// Returns the content of the initial frame for fixed-field writes.
    ///
    /// Empty if the message has no frames.
    pub fn initial_content_mut(&mut self) -> &mut [u8] {
        match self.frames.first_mut() {
            Some(frame) => &mut frame.content[..],
            None => &mut [],
        }
    }

    /// Returns a reference to all frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Consumes the message and returns its frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    /// Returns a read cursor over the frames after the initial frame.
    pub fn reader(&self) -> FrameReader<'_> {
        FrameReader::new(self.frames.get(1..).unwrap_or(&[]))
    }

    /// Returns the number of frames in the message.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the message has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Calculates the total size of the message on the wire.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(|f| f.wire_size()).sum()
    }

    /// Writes all frames to the destination buffer, flagging the last one
    /// as final.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        let last = self.frames.len().saturating_sub(1);
        for (index, frame) in self.frames.iter().enumerate() {
            let extra = if index == last { IS_FINAL_FLAG } else { DEFAULT_FLAGS };
            frame.write_with_flags(dst, extra);
        }
    }

    /// Returns the wire encoding of this message.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.write_to(&mut buf);
        buf
    }
}
