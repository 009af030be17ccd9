#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use gridlink_core::protocol::{ClientMessage, ClientMessageCodec};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = ClientMessageCodec::new().with_max_frame_length(64 * 1024);
    let mut buf = BytesMut::from(data);

    while let Ok(Some(msg)) = codec.decode(&mut buf) {
        let _ = msg.message_type();
        let _ = msg.correlation_id();
        let _ = msg.partition_id();
        let _ = msg.is_event();

        let mut reader = msg.reader();
        while reader.next_frame().is_ok() {}

        let reencoded = ClientMessage::from_frames(msg.into_frames());
        assert_eq!(reencoded.to_bytes().len(), reencoded.wire_size());
    }
    let _ = codec.pending_fragments();
});
