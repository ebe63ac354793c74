#![no_main]
use libfuzzer_sys::fuzz_target;
use lz4_frame::{decode, encode, CompressionSettings};

fuzz_target!(|data: &[u8]| {
    // the first byte picks the settings, the rest is the content
    let (selector, content) = match data.split_first() {
        Some((&selector, content)) => (selector, content),
        None => (0, data),
    };

    let mut settings = CompressionSettings::default();
    settings
        .block_dependency(selector & 1 != 0)
        .block_checksum(selector & 2 != 0)
        .stream_checksum(selector & 4 != 0)
        .blocksize_code(4 + (selector >> 3 & 3));
    let level = (selector >> 5) as i32 * 3;

    let compressed = encode(content, level, &settings).expect("Could not compress input data");
    let roundtripped = decode(&compressed).expect("Could not read decompressed data");
    assert!(roundtripped == content);
});
