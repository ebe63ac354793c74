//! A pure Rust implementation of the LZ4 frame format.
//!
//! Frames are what the `lz4` command line tool reads and writes: a header, a sequence of
//! compressed (or, if compression did not help, stored) blocks and optional checksums. Streams in
//! the older legacy format can be read as well.
//!
//! ```
//! use lz4_frame::{decode, encode, CompressionSettings};
//!
//! let mut settings = CompressionSettings::default();
//! settings.block_checksum(true);
//! let compressed = encode(b"hello hello hello hello", 1, &settings)?;
//! assert_eq!(decode(&compressed)?, b"hello hello hello hello");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! For streaming use, [`LZ4FrameEncoder`] implements `Write` and [`LZ4FrameDecoder`] implements
//! `Read` and `BufRead`. The [`raw`] module exposes the block format underneath.

#![forbid(unsafe_code)]

pub mod framed;
pub mod raw;

use std::io::{Read, Write};
use fehler::throws;

pub use framed::{
    BlockSize, CompressionError, CompressionSettings, ConfigError, DecompressionError, FrameDescriptor,
    LZ4FrameDecoder, LZ4FrameEncoder, LZ4FrameReader, StreamFormat, OPTION_NAMES,
};
pub use raw::CompressionLevel;

/// Compress `input` into a single frame.
#[throws(CompressionError)]
pub fn encode(input: &[u8], level: impl Into<CompressionLevel>, settings: &CompressionSettings) -> Vec<u8> {
    let mut encoder = LZ4FrameEncoder::new(Vec::with_capacity(input.len() / 2 + 32), level, settings)?;
    encoder.write_chunk(input)?;
    encoder.finish()?
}

/// Start a frame in `sink`. Same as [`LZ4FrameEncoder::new`].
#[throws(CompressionError)]
pub fn encoder<W: Write>(sink: W, level: impl Into<CompressionLevel>, settings: &CompressionSettings) -> LZ4FrameEncoder<W> {
    LZ4FrameEncoder::new(sink, level, settings)?
}

/// Start a frame in `sink` and hand the encoder to `f`.
///
/// The encoder is closed once `f` returns, whether it succeeded or not. If both fail, the error
/// of `f` is reported. Pass `&mut sink` to keep using the sink afterwards.
pub fn encode_with<W, T, E, F>(sink: W, level: impl Into<CompressionLevel>, settings: &CompressionSettings, f: F) -> Result<T, E>
where
    W: Write,
    E: From<CompressionError>,
    F: FnOnce(&mut LZ4FrameEncoder<W>) -> Result<T, E>,
{
    let mut encoder = LZ4FrameEncoder::new(sink, level, settings)?;
    let result = f(&mut encoder);
    let closed = encoder.close();
    let value = result?;
    closed?;
    Ok(value)
}

/// Decompress a complete stream, frame or legacy.
#[throws(DecompressionError)]
pub fn decode(input: &[u8]) -> Vec<u8> {
    let mut decoder = LZ4FrameDecoder::new(input)?;
    let content = decoder.read_all();
    decoder.close();
    content?
}

/// Read the stream header from `source`. Same as [`LZ4FrameDecoder::new`].
#[throws(DecompressionError)]
pub fn decoder<R: Read>(source: R) -> LZ4FrameDecoder<R> {
    LZ4FrameDecoder::new(source)?
}

/// Read the stream header from `source` and hand the decoder to `f`.
///
/// The decoder is closed once `f` returns, whether it succeeded or not.
pub fn decode_with<R, T, E, F>(source: R, f: F) -> Result<T, E>
where
    R: Read,
    E: From<DecompressionError>,
    F: FnOnce(&mut LZ4FrameDecoder<R>) -> Result<T, E>,
{
    let mut decoder = LZ4FrameDecoder::new(source)?;
    let result = f(&mut decoder);
    decoder.close();
    result
}
