//! Sequential read cursor over the frames of a message.

use super::frame::Frame;
use crate::error::{GridError, Result};

/// Walks the variable-size frames of a message in order.
///
/// Codecs pull one frame per field. Nested structures are bracketed by
/// begin/end data-structure frames; [`skip_to_struct_end`](Self::skip_to_struct_end)
/// lets a decoder ignore trailing fields added by newer protocol revisions.
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    frames: &'a [Frame],
    position: usize,
}

impl<'a> FrameReader<'a> {
    /// Creates a reader positioned at the first of `frames`.
    pub fn new(frames: &'a [Frame]) -> Self {
        Self {
            frames,
            position: 0,
        }
    }

    /// Returns true if at least one frame remains.
    pub fn has_next(&self) -> bool {
        self.position < self.frames.len()
    }

    /// Returns the next frame without consuming it.
    pub fn peek(&self) -> Option<&'a Frame> {
        self.frames.get(self.position)
    }

    /// Consumes and returns the next frame.
    pub fn next_frame(&mut self) -> Result<&'a Frame> {
        let frame = self.frames.get(self.position).ok_or_else(|| {
            GridError::Protocol(format!(
                "message ended after {} frames while more fields were expected",
                self.position
            ))
        })?;
        self.position += 1;
        Ok(frame)
    }

    /// Consumes the next frame if it is a null frame and reports whether it was.
    pub fn next_is_null(&mut self) -> bool {
        match self.peek() {
            Some(frame) if frame.is_null_frame() => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    /// Consumes the next frame if it closes a structure and reports whether it did.
    pub fn next_is_struct_end(&mut self) -> bool {
        match self.peek() {
            Some(frame) if frame.is_end_frame() => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    /// Consumes a frame that must open a nested structure.
    pub fn expect_begin(&mut self) -> Result<()> {
        let frame = self.next_frame()?;
        if frame.is_begin_frame() {
            Ok(())
        } else {
            Err(GridError::Protocol(
                "expected the start of a nested structure".to_string(),
            ))
        }
    }

    /// Consumes frames up to and including the end of the current structure,
    /// skipping any nested structures along the way.
    pub fn skip_to_struct_end(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            let frame = self.next_frame()?;
            if frame.is_end_frame() {
                depth -= 1;
            } else if frame.is_begin_frame() {
                depth += 1;
            }
        }
        Ok(())
    }
}
