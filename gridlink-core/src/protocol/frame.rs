//! Frame type of the client protocol.

use bytes::{Buf, BufMut, BytesMut};

use super::constants::*;
use crate::error::{GridError, Result};

/// A single frame of a client message.
///
/// Each frame consists of:
/// - A 4-byte length field (little-endian) covering the whole frame
/// - A 2-byte flags field (little-endian)
/// - Variable-length content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame content (payload after flags).
    pub content: BytesMut,
    /// Frame flags indicating frame type and properties.
    pub flags: u16,
}

impl Frame {
    /// Creates a new frame with the given content and flags.
    pub fn new(content: BytesMut, flags: u16) -> Self {
        Self { content, flags }
    }

    /// Creates a new frame with content and default flags.
    pub fn with_content(content: BytesMut) -> Self {
        Self::new(content, DEFAULT_FLAGS)
    }

    /// Creates a new empty frame with the given flags.
    pub fn with_flags(flags: u16) -> Self {
        Self::new(BytesMut::new(), flags)
    }

    /// Creates a frame of `len` zeroed bytes, ready for fixed-size field writes.
    pub fn zeroed(len: usize, flags: u16) -> Self {
        Self::new(BytesMut::zeroed(len), flags)
    }

    /// Creates a frame opening a nested structure.
    pub fn new_begin_frame() -> Self {
        Self::with_flags(BEGIN_DATA_STRUCTURE_FLAG)
    }

    /// Creates a frame closing a nested structure.
    pub fn new_end_frame() -> Self {
        Self::with_flags(END_DATA_STRUCTURE_FLAG)
    }

    /// Creates a null frame (represents an absent value).
    pub fn new_null_frame() -> Self {
        Self::with_flags(IS_NULL_FLAG)
    }

    /// Returns true if this frame opens a nested structure.
    pub fn is_begin_frame(&self) -> bool {
        self.flags & BEGIN_DATA_STRUCTURE_FLAG != 0
    }

    /// Returns true if this frame closes a nested structure.
    pub fn is_end_frame(&self) -> bool {
        self.flags & END_DATA_STRUCTURE_FLAG != 0
    }

    /// Returns true if this frame has the NULL flag set.
    pub fn is_null_frame(&self) -> bool {
        self.flags & IS_NULL_FLAG != 0
    }

    /// Returns true if this frame has the FINAL flag set.
    pub fn is_final_frame(&self) -> bool {
        self.flags & IS_FINAL_FLAG != 0
    }

    /// Returns true if this frame has the EVENT flag set.
    pub fn is_event_frame(&self) -> bool {
        self.flags & IS_EVENT_FLAG != 0
    }

    /// Returns true if this frame has the BACKUP_EVENT flag set.
    pub fn is_backup_event_frame(&self) -> bool {
        self.flags & BACKUP_EVENT_FLAG != 0
    }

    /// Returns true if this initial frame heads a complete, unfragmented message.
    pub fn is_unfragmented(&self) -> bool {
        self.flags & UNFRAGMENTED_MESSAGE == UNFRAGMENTED_MESSAGE
    }

    /// Returns true if this fragment-ID frame starts a fragmented message.
    pub fn is_begin_fragment(&self) -> bool {
        self.flags & UNFRAGMENTED_MESSAGE == BEGIN_FRAGMENT_FLAG
    }

    /// Returns true if this fragment-ID frame ends a fragmented message.
    pub fn is_end_fragment(&self) -> bool {
        self.flags & UNFRAGMENTED_MESSAGE == END_FRAGMENT_FLAG
    }

    /// Returns the size of this frame on the wire.
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.content.len()
    }

    /// Writes this frame to the given buffer with `extra_flags` OR-ed in.
    pub fn write_with_flags(&self, dst: &mut BytesMut, extra_flags: u16) {
        dst.reserve(self.wire_size());
        dst.put_u32_le(self.wire_size() as u32);
        dst.put_u16_le(self.flags | extra_flags);
        dst.put_slice(&self.content);
    }

    /// Writes this frame to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        self.write_with_flags(dst, DEFAULT_FLAGS);
    }

    /// Reads a frame from the given buffer.
    ///
    /// Returns `Ok(None)` without consuming anything if the buffer does not
    /// hold a complete frame yet. A declared length smaller than the frame
    /// header or larger than `max_frame_length` is a protocol error.
    pub fn read_from(src: &mut BytesMut, max_frame_length: usize) -> Result<Option<Self>> {
        if src.len() < SIZE_OF_FRAME_LENGTH_FIELD {
            return Ok(None);
        }

        let frame_length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if frame_length < FRAME_HEADER_SIZE {
            return Err(GridError::Protocol(format!(
                "frame length {} is smaller than the frame header",
                frame_length
            )));
        }
        if frame_length > max_frame_length {
            return Err(GridError::Protocol(format!(
                "frame length {} exceeds the limit of {} bytes",
                frame_length, max_frame_length
            )));
        }

        if src.len() < frame_length {
            src.reserve(frame_length - src.len());
            return Ok(None);
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        let flags = src.get_u16_le();
        let content = src.split_to(frame_length - FRAME_HEADER_SIZE);

        Ok(Some(Self::new(content, flags)))
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::with_flags(DEFAULT_FLAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(buf: &mut BytesMut) -> Option<Frame> {
        Frame::read_from(buf, DEFAULT_MAX_FRAME_LENGTH).unwrap()
    }

    #[test]
    fn test_frame_flags() {
        let begin = Frame::new_begin_frame();
        assert!(begin.is_begin_frame());
        assert!(!begin.is_end_frame());

        let end = Frame::new_end_frame();
        assert!(!end.is_begin_frame());
        assert!(end.is_end_frame());

        assert!(Frame::new_null_frame().is_null_frame());
        assert!(Frame::with_flags(IS_FINAL_FLAG).is_final_frame());
        assert!(Frame::with_flags(IS_EVENT_FLAG).is_event_frame());
        assert!(Frame::with_flags(BACKUP_EVENT_FLAG).is_backup_event_frame());
    }

    #[test]
    fn test_fragment_flags() {
        assert!(Frame::with_flags(UNFRAGMENTED_MESSAGE).is_unfragmented());
        assert!(!Frame::with_flags(UNFRAGMENTED_MESSAGE).is_begin_fragment());
        assert!(Frame::with_flags(BEGIN_FRAGMENT_FLAG).is_begin_fragment());
        assert!(Frame::with_flags(END_FRAGMENT_FLAG | IS_FINAL_FLAG).is_end_fragment());

        let middle = Frame::with_flags(DEFAULT_FLAGS);
        assert!(!middle.is_unfragmented());
        assert!(!middle.is_begin_fragment());
        assert!(!middle.is_end_fragment());
    }

    #[test]
    fn test_wire_size() {
        assert_eq!(Frame::default().wire_size(), 6);
        let with_content = Frame::with_content(BytesMut::from(&[1, 2, 3, 4, 5][..]));
        assert_eq!(with_content.wire_size(), 11);
    }

    #[test]
    fn test_length_field_covers_header() {
        let frame = Frame::new(BytesMut::from(&[0xAA, 0xBB][..]), IS_NULL_FLAG);
        let mut buf = BytesMut::new();
        frame.write_to(&mut buf);

        assert_eq!(&buf[..4], &8u32.to_le_bytes());
        assert_eq!(&buf[4..6], &IS_NULL_FLAG.to_le_bytes());
        assert_eq!(&buf[6..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_write_and_read_frame() {
        let original = Frame::new(
            BytesMut::from(&[0xDE, 0xAD, 0xBE, 0xEF][..]),
            BEGIN_DATA_STRUCTURE_FLAG,
        );
        let mut buf = BytesMut::new();
        original.write_to(&mut buf);
        assert_eq!(buf.len(), original.wire_size());

        let decoded = read(&mut buf).unwrap();
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_write_with_extra_flags() {
        let frame = Frame::with_flags(UNFRAGMENTED_MESSAGE);
        let mut buf = BytesMut::new();
        frame.write_with_flags(&mut buf, IS_FINAL_FLAG);

        let decoded = read(&mut buf).unwrap();
        assert!(decoded.is_final_frame());
        assert!(decoded.is_unfragmented());
    }

    #[test]
    fn test_read_incomplete_length() {
        let mut buf = BytesMut::from(&[0x01, 0x02][..]);
        assert!(read(&mut buf).is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_read_incomplete_content() {
        let mut buf = BytesMut::from(&[
            0x0A, 0x00, 0x00, 0x00, // length = 10 (header + 4 bytes content)
            0x00, 0x80, // flags
            0x01, 0x02, // only 2 bytes of content
        ][..]);
        assert!(read(&mut buf).is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_read_empty_frame() {
        let mut buf = BytesMut::from(&[
            0x06, 0x00, 0x00, 0x00, // length = 6 (just the header)
            0x00, 0x08, // END_DATA_STRUCTURE
        ][..]);

        let frame = read(&mut buf).unwrap();
        assert!(frame.is_end_frame());
        assert!(frame.content.is_empty());
    }

    #[test]
    fn test_read_rejects_undersized_length() {
        let mut buf = BytesMut::from(&[0x03, 0x00, 0x00, 0x00, 0x00, 0x00][..]);
        let err = Frame::read_from(&mut buf, DEFAULT_MAX_FRAME_LENGTH).unwrap_err();
        assert!(matches!(err, GridError::Protocol(_)));
    }

    #[test]
    fn test_read_rejects_oversized_length() {
        let mut buf = BytesMut::from(&[0x00, 0x10, 0x00, 0x00, 0x00, 0x00][..]);
        let err = Frame::read_from(&mut buf, 1024).unwrap_err();
        assert!(matches!(err, GridError::Protocol(_)));
    }

    #[test]
    fn test_read_large_frame() {
        let content: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();
        let original = Frame::with_content(BytesMut::from(&content[..]));

        let mut buf = BytesMut::new();
        original.write_to(&mut buf);

        let decoded = read(&mut buf).unwrap();
        assert_eq!(&decoded.content[..], &content[..]);
    }

    #[test]
    fn test_zeroed_frame() {
        let frame = Frame::zeroed(16, UNFRAGMENTED_MESSAGE);
        assert_eq!(frame.content.len(), 16);
        assert!(frame.content.iter().all(|b| *b == 0));
    }
}
