//! Codec implementation for encoding/decoding client messages on a stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use super::fragment::{split_into_fragments, FragmentAssembler};
use super::frame::Frame;
use super::ClientMessage;
use crate::error::{GridError, Result};

/// Codec for encoding and decoding client messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O. Decoding reads frames until one is flagged
/// final; fragments are handed to a [`FragmentAssembler`] and only whole
/// messages are yielded. Encoding splits messages larger than the
/// configured fragment size.
#[derive(Debug)]
pub struct ClientMessageCodec {
    /// Frames accumulated while decoding a multi-frame message.
    pending_frames: Vec<Frame>,
    assembler: FragmentAssembler,
    max_frame_length: usize,
    max_fragment_size: Option<usize>,
    next_fragment_id: i64,
}

impl Default for ClientMessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMessageCodec {
    /// Creates a codec that never fragments outgoing messages.
    pub fn new() -> Self {
        Self {
            pending_frames: Vec::new(),
            assembler: FragmentAssembler::new(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_fragment_size: None,
            next_fragment_id: 0,
        }
    }

    /// Sets the largest frame accepted from the peer.
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    /// Splits outgoing messages larger than `max_fragment_size` bytes.
    pub fn with_max_fragment_size(mut self, max_fragment_size: usize) -> Self {
        self.max_fragment_size = Some(max_fragment_size);
        self
    }

    /// Returns the number of fragmented messages still being received.
    pub fn pending_fragments(&self) -> usize {
        self.assembler.pending()
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = GridError;

    fn encode(&mut self, item: ClientMessage, dst: &mut BytesMut) -> Result<()> {
        if item.is_empty() {
            return Err(GridError::Protocol("cannot encode empty message".to_string()));
        }

        match self.max_fragment_size {
            Some(limit) if item.wire_size() > limit => {
                let fragment_id = self.next_fragment_id;
                self.next_fragment_id = self.next_fragment_id.wrapping_add(1);
                for fragment in split_into_fragments(item, limit, fragment_id) {
                    fragment.write_to(dst);
                }
            }
            _ => item.write_to(dst),
        }
        Ok(())
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = GridError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(frame) = Frame::read_from(src, self.max_frame_length)? else {
                return Ok(None);
            };

            let is_final = frame.is_final_frame();
            self.pending_frames.push(frame);
            if !is_final {
                continue;
            }

            let frames = std::mem::take(&mut self.pending_frames);
            if frames[0].is_unfragmented() {
                return Ok(Some(ClientMessage::from_frames(frames)));
            }
            if let Some(message) = self.assembler.accept(frames)? {
                return Ok(Some(message));
            }
        }
    }
}
