//! Block framing: the size word, the payload and the optional checksums around it.

use std::io::{self, ErrorKind, Read, Write};
use byteorder::{ByteOrder, LE, WriteBytesExt};
use fehler::{throw, throws};

use crate::raw::compress_bound;
use super::{xxh32, INCOMPRESSIBLE, LEGACY_BLOCK_MAXSIZE};
use super::decompress::DecompressionError;

/// Write one block. The checksum, if any, covers `payload` exactly as it is stored.
#[throws(io::Error)]
pub(crate) fn write_block<W: Write>(writer: &mut W, payload: &[u8], compressed: bool, checksum: bool) {
    let mut word = payload.len() as u32;
    if !compressed {
        word |= INCOMPRESSIBLE;
    }
    writer.write_u32::<LE>(word)?;
    writer.write_all(payload)?;
    if checksum {
        writer.write_u32::<LE>(xxh32(payload))?;
    }
}

/// The zero word that ends a frame, followed by the content checksum if there is one.
#[throws(io::Error)]
pub(crate) fn write_end_mark<W: Write>(writer: &mut W, content_checksum: Option<u32>) {
    writer.write_u32::<LE>(0)?;
    if let Some(checksum) = content_checksum {
        writer.write_u32::<LE>(checksum)?;
    }
}

/// Like `read_exact`, but reports how far it got.
fn read_up_to<R: Read>(reader: &mut R, mut buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => {
                got += n;
                buf = &mut buf[n..];
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}

/// A little-endian u32, or `None` if the source is already exhausted.
#[throws(DecompressionError)]
fn read_word<R: Read>(reader: &mut R) -> Option<u32> {
    let mut buf = [0u8; 4];
    match read_up_to(reader, &mut buf)? {
        0 => None,
        4 => Some(LE::read_u32(&buf)),
        got => throw!(DecompressionError::TruncatedBlock { needed: 4, got }),
    }
}

#[throws(DecompressionError)]
fn read_checksum<R: Read>(reader: &mut R) -> u32 {
    match read_word(reader)? {
        Some(checksum) => checksum,
        None => throw!(DecompressionError::TruncatedBlock { needed: 4, got: 0 }),
    }
}

#[throws(DecompressionError)]
fn read_payload<R: Read>(reader: &mut R, size: usize, buf: &mut Vec<u8>) {
    buf.clear();
    reader.by_ref().take(size as u64).read_to_end(buf)?;
    if buf.len() != size {
        throw!(DecompressionError::TruncatedBlock { needed: size, got: buf.len() });
    }
}

/// Read the next block of a frame into `buf`.
///
/// Returns whether the payload is compressed, or `None` once the end mark is reached. A source
/// that ends before the end mark is an error.
#[throws(DecompressionError)]
pub(crate) fn read_block<R: Read>(reader: &mut R, block_maxsize: usize, checksum: bool, buf: &mut Vec<u8>) -> Option<bool> {
    let word = match read_word(reader)? {
        Some(word) => word,
        None => throw!(DecompressionError::UnexpectedEnd),
    };
    if word == 0 {
        return None;
    }

    let compressed = (word & INCOMPRESSIBLE) == 0;
    let size = (word & !INCOMPRESSIBLE) as usize;
    if size > block_maxsize {
        throw!(DecompressionError::BlockTooBig { size, max: block_maxsize });
    }
    read_payload(reader, size, buf)?;

    if checksum && read_checksum(reader)? != xxh32(buf) {
        throw!(DecompressionError::BlockChecksumFail);
    }

    Some(compressed)
}

/// Read the next block of a legacy stream into `buf`, `false` once the source is exhausted.
///
/// Legacy blocks are always compressed and carry no checksum.
#[throws(DecompressionError)]
pub(crate) fn read_legacy_block<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> bool {
    let size = match read_word(reader)? {
        None | Some(0) => return false,
        Some(size) => size as usize,
    };
    let max = compress_bound(LEGACY_BLOCK_MAXSIZE);
    if size > max {
        throw!(DecompressionError::BlockTooBig { size, max });
    }
    read_payload(reader, size, buf)?;
    true
}

/// Read the content checksum that follows the end mark.
#[throws(DecompressionError)]
pub(crate) fn read_content_checksum<R: Read>(reader: &mut R) -> u32 {
    read_checksum(reader)?
}
