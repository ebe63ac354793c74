//! The LZ4 frame format.
//!
//! A frame is a header describing the stream, a sequence of blocks, an end mark and an optional
//! checksum over all decompressed content. This is the format written and read by the `lz4`
//! command line tool.

mod block;
mod codec;
mod compress;
mod decompress;
mod header;
mod options;

use std::hash::Hasher;
use twox_hash::XxHash32;

/// The four magic bytes at the start of every LZ4 frame.
const MAGIC: u32 = 0x184D2204;
/// The four magic bytes at the start of a stream in the legacy format.
const LEGACY_MAGIC: u32 = 0x184C2102;
/// The frame format sets the high bit of every length field to indicate that the data was not compressed.
const INCOMPRESSIBLE: u32 = 1 << 31;
/// The LZ4 raw format maintains a lookback window of exactly 64KiB.
const WINDOW_SIZE: usize = 64 * 1024;
/// Legacy blocks always hold 8 MiB of data, except for the last one.
const LEGACY_BLOCK_MAXSIZE: usize = 8 << 20;

/// xxHash-32 with seed 0, which is what every checksum of the format uses.
fn xxh32(data: &[u8]) -> u32 {
    let mut hasher = XxHash32::with_seed(0);
    hasher.write(data);
    hasher.finish() as u32
}

pub use compress::{CompressionError, LZ4FrameEncoder};
pub use decompress::{DecompressionError, LZ4FrameDecoder, LZ4FrameReader};
pub use header::{BlockSize, Flags, FrameDescriptor, ParseError, StreamFormat};
pub use options::{CompressionSettings, ConfigError, OPTION_NAMES};
