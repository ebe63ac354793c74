//! The raw LZ4 block format.
//!
//! Using this directly saves you the overhead of framing (7 to 19 bytes of header plus 4 bytes per block)
//! but you lose several features, most notably the fallback mechanism for incompressible data: if the
//! compressed version of a block would be larger, the frame layer stores the uncompressed version instead.
//! Raw blocks also carry neither their own length nor any checksum, so the caller has to know an upper
//! bound of the decompressed size.

mod compress;
mod decompress;

pub use compress::{compress_block, compress_block_bounded, compress_bound, CompressError, CompressionLevel};
pub use decompress::{decompress_block, decompress_block_with_prefix, DecodeError};

pub(crate) use compress::{BoundedWriter, Engine};
pub(crate) use decompress::decompress_into;
