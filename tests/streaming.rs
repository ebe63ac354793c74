use std::io::{self, BufRead, Read, Write};
use lz4_frame::{decode, decoder, encode, encoder, CompressionSettings, LZ4FrameDecoder};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn sample() -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut data = Vec::new();
    while data.len() < 700_000 {
        if rng.gen_bool(0.5) {
            let len = rng.gen_range(1, 2000);
            data.extend((0..len).map(|_| rng.gen::<u8>()));
        } else {
            let len = rng.gen_range(1, 5000);
            let byte = rng.gen::<u8>();
            data.extend(std::iter::repeat(byte).take(len));
        }
    }
    data
}

fn small_blocks(dependency: bool) -> CompressionSettings {
    let mut settings = CompressionSettings::default();
    settings.blocksize_code(4).block_dependency(dependency).block_checksum(true);
    settings
}

#[test]
fn chunked_writes_match_a_single_write() {
    let data = sample();
    for &dependency in &[false, true] {
        let settings = small_blocks(dependency);
        let whole = encode(&data, 1, &settings).unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let mut out = Vec::new();
        let mut encoder = encoder(&mut out, 1, &settings).unwrap();
        let mut rest = &data[..];
        while !rest.is_empty() {
            let n = rng.gen_range(0, 100_000).min(rest.len());
            assert_eq!(encoder.write_chunk(&rest[..n]).unwrap(), n);
            rest = &rest[n..];
        }
        encoder.finish().unwrap();
        assert_eq!(out, whole);
    }
}

#[test]
fn io_copy_into_the_encoder() {
    let data = sample();
    let settings = small_blocks(false);
    let mut encoder = encoder(Vec::new(), 1, &settings).unwrap();
    io::copy(&mut &data[..], &mut encoder).unwrap();
    encoder.flush().unwrap();
    let compressed = encoder.finish().unwrap();
    assert_eq!(compressed, encode(&data, 1, &settings).unwrap());
}

#[test]
fn partial_reads_match_read_all() {
    let data = sample();
    for &dependency in &[false, true] {
        let compressed = encode(&data, 1, &small_blocks(dependency)).unwrap();

        let mut decoder = LZ4FrameDecoder::new(&compressed[..]).unwrap();
        assert_eq!(decoder.read_all().unwrap(), data);
        assert_eq!(decoder.read_part(1).unwrap(), None);

        let mut decoder = LZ4FrameDecoder::new(&compressed[..]).unwrap();
        let mut pieces = Vec::new();
        while let Some(piece) = decoder.read_part(19).unwrap() {
            assert!(piece.len() == 19 || decoder.is_eof().unwrap());
            pieces.extend_from_slice(&piece);
        }
        assert_eq!(pieces, data);

        let mut decoder = LZ4FrameDecoder::new(&compressed[..]).unwrap();
        let mut mixed = decoder.read_part(23).unwrap().unwrap();
        mixed.extend(decoder.read_all().unwrap());
        assert_eq!(mixed, data);
        assert!(decoder.is_eof().unwrap());
    }
}

#[test]
fn byte_by_byte() {
    let data = &sample()[..3000];
    let compressed = encode(data, 1, &small_blocks(true)).unwrap();
    let mut decoder = decoder(&compressed[..]).unwrap();
    let mut bytes = Vec::new();
    while let Some(byte) = decoder.read_byte().unwrap() {
        bytes.push(byte);
    }
    assert_eq!(bytes, data);
}

#[test]
fn read_traits() {
    let text: String = (0..5000).map(|i| format!("line {}\n", i)).collect();
    let compressed = encode(text.as_bytes(), 1, &small_blocks(false)).unwrap();

    let lines: Vec<String> = decoder(&compressed[..]).unwrap().lines().collect::<io::Result<_>>().unwrap();
    assert_eq!(lines.len(), 5000);
    assert_eq!(lines[4321], "line 4321");

    let mut copied = Vec::new();
    io::copy(&mut decoder(&compressed[..]).unwrap(), &mut copied).unwrap();
    assert_eq!(copied, text.as_bytes());

    let mut prefix = [0u8; 10];
    decoder(&compressed[..]).unwrap().read_exact(&mut prefix).unwrap();
    assert_eq!(&prefix, b"line 0\nlin");
}

#[test]
fn decoding_from_a_file() {
    let data = sample();
    let mut file = tempfile::tempfile().unwrap();
    {
        let mut encoder = encoder(&mut file, 1, &small_blocks(true)).unwrap();
        encoder.write_all(&data).unwrap();
        encoder.close().unwrap();
    }
    io::Seek::seek(&mut file, io::SeekFrom::Start(0)).unwrap();
    let mut decoder = decoder(io::BufReader::new(file)).unwrap();
    assert_eq!(decoder.read_all().unwrap(), data);
    assert!(decoder.close().is_some());
    assert_eq!(decode(&encode(&data, 1, &small_blocks(true)).unwrap()).unwrap(), data);
}
