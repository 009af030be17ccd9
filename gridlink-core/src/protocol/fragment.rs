//! Splitting oversized messages into fragments and putting them back together.
//!
//! A fragment is written like a message of its own: its first frame holds
//! the 8-byte fragmentation ID and is flagged `BEGIN_FRAGMENT` (first
//! fragment), `END_FRAGMENT` (last fragment) or neither (middle fragments);
//! the message's frames follow, and the last of them is written final.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use super::client_message::ClientMessage;
use super::constants::*;
use super::fixed;
use super::frame::Frame;
use crate::error::{GridError, Result};

fn fragment_id_frame(fragment_id: i64, flags: u16) -> Frame {
    let mut content = BytesMut::with_capacity(FRAGMENTATION_ID_SIZE);
    content.put_i64_le(fragment_id);
    Frame::new(content, flags)
}

/// Splits `message` into fragments of at most `max_fragment_size` wire bytes.
///
/// A message that already fits is returned as-is. Every fragment carries at
/// least one frame, so a single frame larger than the limit travels alone.
pub fn split_into_fragments(
    message: ClientMessage,
    max_fragment_size: usize,
    fragment_id: i64,
) -> Vec<ClientMessage> {
    if message.wire_size() <= max_fragment_size {
        return vec![message];
    }

    let id_frame_size = FRAME_HEADER_SIZE + FRAGMENTATION_ID_SIZE;
    let mut fragments: Vec<Vec<Frame>> = Vec::new();
    let mut current: Vec<Frame> = Vec::new();
    let mut current_size = id_frame_size;

    for frame in message.into_frames() {
        if !current.is_empty() && current_size + frame.wire_size() > max_fragment_size {
            fragments.push(std::mem::take(&mut current));
            current_size = id_frame_size;
        }
        current_size += frame.wire_size();
        current.push(frame);
    }
    if !current.is_empty() {
        fragments.push(current);
    }

    let last = fragments.len() - 1;
    fragments
        .into_iter()
        .enumerate()
        .map(|(index, frames)| {
            let flags = match index {
                0 => BEGIN_FRAGMENT_FLAG,
                i if i == last => END_FRAGMENT_FLAG,
                _ => DEFAULT_FLAGS,
            };
            let mut all = Vec::with_capacity(frames.len() + 1);
            all.push(fragment_id_frame(fragment_id, flags));
            all.extend(frames);
            ClientMessage::from_frames(all)
        })
        .collect()
}

/// Collects fragments per fragmentation ID until the end fragment arrives.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    in_progress: HashMap<i64, Vec<Frame>>,
}

impl FragmentAssembler {
    /// Creates an assembler with nothing in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of partially received messages.
    pub fn pending(&self) -> usize {
        self.in_progress.len()
    }

    /// Feeds one complete fragment (its ID frame followed by its frames).
    ///
    /// Returns the reassembled message once the end fragment arrives.
    /// Middle or end fragments for an unknown ID are dropped.
    pub fn accept(&mut self, fragment: Vec<Frame>) -> Result<Option<ClientMessage>> {
        let mut frames = fragment.into_iter();
        let id_frame = frames
            .next()
            .ok_or_else(|| GridError::Protocol("empty fragment".to_string()))?;
        let fragment_id = fixed::decode_i64(&id_frame.content, 0)?;

        let mut body: Vec<Frame> = frames
            .map(|mut frame| {
                frame.flags &= !IS_FINAL_FLAG;
                frame
            })
            .collect();

        if id_frame.is_begin_fragment() {
            if self.in_progress.insert(fragment_id, body).is_some() {
                tracing::warn!(fragment_id, "fragment sequence restarted, dropping earlier part");
            }
            return Ok(None);
        }

        let Some(collected) = self.in_progress.get_mut(&fragment_id) else {
            tracing::warn!(fragment_id, "dropping fragment of unknown message");
            return Ok(None);
        };
        collected.append(&mut body);

        if id_frame.is_end_fragment() {
            let frames = self.in_progress.remove(&fragment_id).unwrap_or_default();
            return Ok(Some(ClientMessage::from_frames(frames)));
        }
        Ok(None)
    }
}
