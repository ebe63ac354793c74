use lz4_frame::{decode, encode, CompressionSettings, LZ4FrameDecoder};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn settings(block_dependency: bool, block_checksum: bool, stream_checksum: bool, blocksize_code: u8) -> CompressionSettings {
    let mut settings = CompressionSettings::default();
    settings
        .block_dependency(block_dependency)
        .block_checksum(block_checksum)
        .stream_checksum(stream_checksum)
        .blocksize_code(blocksize_code);
    settings
}

fn random(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill(&mut data[..]);
    data
}

fn samples(len: usize) -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("zeros", vec![0u8; len]),
        ("0xaa", vec![0xAAu8; len]),
        ("random", random(len, len as u64)),
    ]
}

fn check(data: &[u8], level: i32, settings: &CompressionSettings, what: &str) {
    let compressed = encode(data, level, settings).unwrap();
    assert_eq!(decode(&compressed).unwrap(), data, "{} with {:?}", what, settings);
}

#[test]
fn every_flag_combination_and_block_size() {
    let mut small = samples(400);
    small.push(("empty", Vec::new()));
    let text: Vec<u8> = (0..3000).flat_map(|i| format!("line {} of some repetitive text\n", i % 97).into_bytes()).collect();
    small.push(("text", text));

    for bits in 0..8 {
        for code in 4..=7 {
            let settings = settings(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, code);
            for (name, data) in &small {
                check(data, 1, &settings, name);
                check(data, 9, &settings, name);
            }
        }
    }
}

#[test]
fn twelve_megabytes() {
    for (name, data) in samples(12 << 20) {
        let combinations = [
            (false, true, true, 7),
            (true, true, true, 7),
            (true, true, true, 4),
            (false, false, false, 5),
            (true, false, true, 5),
            (false, true, false, 6),
            (true, true, false, 6),
            (false, false, true, 4),
        ];
        for &(dependency, block_checksum, stream_checksum, code) in &combinations {
            check(&data, 1, &settings(dependency, block_checksum, stream_checksum, code), name);
        }
    }
}

#[test]
fn dependent_blocks_reference_earlier_blocks() {
    let sentence = b"Each block on its own starts without history, together they repeat a lot. ";
    let data: Vec<u8> = sentence.iter().copied().cycle().take(20 * 65536).collect();

    let independent = encode(&data, 1, &settings(false, false, true, 4)).unwrap();
    let dependent = encode(&data, 1, &settings(true, false, true, 4)).unwrap();
    assert_eq!(decode(&dependent).unwrap(), data);
    assert!(dependent.len() < independent.len());
}

#[test]
fn high_levels_roundtrip() {
    let data: Vec<u8> = (0..300_000u32).map(|i| ((i * 7) % 253) as u8 ^ ((i >> 11) as u8)).collect();
    for level in &[-5, 0, 3, 4, 8, 16, 40] {
        for &dependency in &[false, true] {
            check(&data, *level, &settings(dependency, false, true, 4), "pattern");
        }
    }
}

#[test]
fn descriptor_is_visible_to_the_decoder() {
    let mut settings = settings(true, true, false, 5);
    settings.stream_size(Some(1000));
    let compressed = encode(&vec![7u8; 1000], 1, &settings).unwrap();

    let decoder = LZ4FrameDecoder::new(&compressed[..]).unwrap();
    let descriptor = decoder.descriptor();
    assert_eq!(descriptor.version(), 1);
    assert!(!descriptor.block_independence());
    assert!(descriptor.block_checksum());
    assert!(!descriptor.stream_checksum());
    assert!(!descriptor.preset_dictionary_present());
    assert_eq!(descriptor.block_maxsize(), 256 * 1024);
    assert_eq!(descriptor.stream_size(), Some(1000));
    assert_eq!(descriptor.dictionary_id(), None);
}
