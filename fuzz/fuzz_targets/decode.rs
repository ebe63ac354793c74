#![no_main]
use libfuzzer_sys::fuzz_target;
use lz4_frame::LZ4FrameDecoder;
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    // we deliberately ignore errors here because random bytes from fuzzer
    // are not valid LZ4 data and so are expected to trigger non-fatal errors
    if let Ok(mut decoder) = LZ4FrameDecoder::new(Cursor::new(data)) {
        let mut output = Vec::new();
        let _ = decoder.read_to_end(&mut output);
    }
    if let Ok(mut decoder) = LZ4FrameDecoder::new(data) {
        while let Ok(Some(_)) = decoder.read_part(77) {}
    }
    let _ = lz4_frame::raw::decompress_block(data, 1 << 16);
});
