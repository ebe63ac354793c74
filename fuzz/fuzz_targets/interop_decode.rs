#![no_main]
use libfuzzer_sys::fuzz_target;
use lz4_frame::LZ4FrameDecoder;
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    let compression_result = reference_compress(data);
    if let Ok(compressed) = compression_result {
        let mut decompressed = Vec::new();
        let mut decoder = LZ4FrameDecoder::new(Cursor::new(compressed)).expect("Failed to create decoder");
        decoder.read_to_end(&mut decompressed).expect("Failed to decompress data compressed by C implementation");
        assert!(data == decompressed.as_slice(), "Decompression result did not match the original input");
    }
});

// compress data using the reference lz4 implementation
fn reference_compress(data: &[u8]) -> Result<Vec<u8>, ()> {
    let mut input = Cursor::new(data);
    let output = Cursor::new(Vec::new());
    let mut encoder = lz4::EncoderBuilder::new()
        .level(4)
        .block_mode(lz4::BlockMode::Linked)
        .checksum(lz4::ContentChecksum::ChecksumEnabled)
        .build(output)
        .map_err(|_| ())?;
    std::io::copy(&mut input, &mut encoder).map_err(|_| ())?;
    let (output, result) = encoder.finish();
    result.map(|()| output.into_inner()).map_err(|_| ())
}
