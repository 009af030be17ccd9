//! Client protocol implementation.
//!
//! Messages are sequences of little-endian frames. This module provides the
//! frame and message types, the fixed-size and variable-size field codecs,
//! fragmentation, and the stream codec used by connections.

pub mod builtin;
mod client_message;
mod codec;
pub mod constants;
pub mod fixed;
mod fragment;
mod frame;
mod reader;

pub use client_message::ClientMessage;
pub use codec::ClientMessageCodec;
pub use constants::*;
pub use fragment::{split_into_fragments, FragmentAssembler};
pub use frame::Frame;
pub use reader::FrameReader;
