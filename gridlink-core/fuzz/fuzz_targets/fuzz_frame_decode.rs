#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;

use gridlink_core::protocol::{Frame, FragmentAssembler};

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);
    let mut frames = Vec::new();
    let mut assembler = FragmentAssembler::new();

    while let Ok(Some(frame)) = Frame::read_from(&mut buf, 64 * 1024) {
        let _ = frame.is_begin_frame();
        let _ = frame.is_end_frame();
        let _ = frame.is_null_frame();
        let _ = frame.is_begin_fragment();
        let _ = frame.is_end_fragment();
        let final_frame = frame.is_final_frame();
        frames.push(frame);
        if final_frame {
            let _ = assembler.accept(std::mem::take(&mut frames));
        }
    }
});
