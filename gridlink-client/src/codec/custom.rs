//! Codecs for the structured types embedded in several messages.

use std::net::{IpAddr, SocketAddr};

use gridlink_core::protocol::builtin::{decode_string, encode_string};
use gridlink_core::protocol::{
    fixed, ClientMessage, Frame, FrameReader, BOOLEAN_SIZE_IN_BYTES, INT_SIZE_IN_BYTES,
    UUID_SIZE_IN_BYTES,
};
use gridlink_core::{GridError, Result};
use uuid::Uuid;

use crate::cluster::Member;

/// Appends a member address as a `(host, port)` structure.
pub fn encode_address(message: &mut ClientMessage, address: &SocketAddr) {
    message.add_frame(Frame::new_begin_frame());
    let mut initial = Frame::zeroed(INT_SIZE_IN_BYTES, 0);
    fixed::encode_i32(&mut initial.content, 0, i32::from(address.port()));
    message.add_frame(initial);
    encode_string(message, &address.ip().to_string());
    message.add_frame(Frame::new_end_frame());
}

/// Reads a member address structure.
///
/// Members report their bind address, so the host must be an IP literal.
pub fn decode_address(reader: &mut FrameReader<'_>) -> Result<SocketAddr> {
    reader.expect_begin()?;
    let port = fixed::decode_i32(&reader.next_frame()?.content, 0)?;
    let host = decode_string(reader)?;
    reader.skip_to_struct_end()?;

    let ip: IpAddr = host
        .parse()
        .map_err(|_| GridError::Protocol(format!("member host '{}' is not an IP address", host)))?;
    let port = u16::try_from(port)
        .map_err(|_| GridError::Protocol(format!("invalid member port {}", port)))?;
    Ok(SocketAddr::new(ip, port))
}

/// Appends a member description.
pub fn encode_member(message: &mut ClientMessage, member: &Member) {
    message.add_frame(Frame::new_begin_frame());
    let mut initial = Frame::zeroed(UUID_SIZE_IN_BYTES + BOOLEAN_SIZE_IN_BYTES, 0);
    fixed::encode_uuid(&mut initial.content, 0, Some(member.uuid));
    fixed::encode_bool(&mut initial.content, UUID_SIZE_IN_BYTES, member.lite_member);
    message.add_frame(initial);
    encode_address(message, &member.address);
    message.add_frame(Frame::new_end_frame());
}

/// Reads a member description.
pub fn decode_member(reader: &mut FrameReader<'_>) -> Result<Member> {
    reader.expect_begin()?;
    let initial = reader.next_frame()?;
    let uuid = fixed::decode_uuid(&initial.content, 0)?
        .ok_or_else(|| GridError::Protocol("member without UUID".to_string()))?;
    let lite_member = fixed::decode_bool(&initial.content, UUID_SIZE_IN_BYTES)?;
    let address = decode_address(reader)?;
    reader.skip_to_struct_end()?;

    Ok(Member {
        uuid,
        address,
        lite_member,
    })
}

/// Appends a frame holding a single UUID.
pub fn encode_uuid_frame(message: &mut ClientMessage, uuid: &Uuid) {
    let mut frame = Frame::zeroed(UUID_SIZE_IN_BYTES, 0);
    fixed::encode_uuid(&mut frame.content, 0, Some(*uuid));
    message.add_frame(frame);
}

/// Reads a frame holding a single non-null UUID.
pub fn decode_uuid_frame(reader: &mut FrameReader<'_>) -> Result<Uuid> {
    fixed::decode_uuid(&reader.next_frame()?.content, 0)?
        .ok_or_else(|| GridError::Protocol("unexpected null UUID".to_string()))
}
