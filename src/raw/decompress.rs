use byteorder::{ReadBytesExt, LE};
use fehler::{throw, throws};
use thiserror::Error;

use super::compress::MINMATCH;

/// Errors when decompressing a raw LZ4 block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeError {
    /// Expected more bytes, but found none.
    /// Either your input was truncated or you're trying to decompress garbage.
    #[error("the compressed block ended in the middle of a sequence")]
    UnexpectedEnd,
    /// An offset of zero never appears in valid data.
    #[error("a match has an offset of zero")]
    ZeroOffset,
    /// The offset for a deduplication is out of bounds.
    /// This may be caused by a missing or incomplete dictionary.
    #[error("a match offset points {0} bytes before the start of the available data")]
    InvalidDeduplicationOffset(usize),
    /// The block decompresses to more data than the caller allowed.
    #[error("the block decompresses to more than {0} bytes")]
    OutputTooLarge(usize),
}

type Error = DecodeError;

/// This is how LZ4 encodes varints.
/// Just keep reading and adding while it's all F
#[throws]
fn read_lsic(initial: u8, reader: &mut &[u8]) -> usize {
    let mut value = initial as usize;
    if value == 0xF {
        loop {
            let more = reader.read_u8().map_err(|_| Error::UnexpectedEnd)?;
            value = value.saturating_add(more as usize);
            if more != 0xFF {
                break;
            }
        }
    }
    value
}

/// Decompress an LZ4-compressed block, appending at most `max_output` bytes to `output`.
///
/// LZ4 heavily relies on a lookback mechanism where bytes earlier in the output stream are referenced.
/// Earlier data is either already in `output` or passed separately in `prefix` (which is how the
/// window of dependent blocks is provided).
#[throws]
pub(crate) fn decompress_into(input: &[u8], prefix: &[u8], output: &mut Vec<u8>, max_output: usize) {
    let limit = output.len().saturating_add(max_output);
    let mut reader = input;
    loop {
        let token = match reader.read_u8() {
            Ok(x) => x,
            // only an empty block ends here, every other block ends after its last literals
            Err(_) => break,
        };

        let literal_length = read_lsic(token >> 4, &mut reader)?;
        if literal_length > reader.len() {
            throw!(Error::UnexpectedEnd);
        }
        if literal_length > limit - output.len() {
            throw!(Error::OutputTooLarge(max_output));
        }
        output.extend_from_slice(&reader[..literal_length]);
        reader = &reader[literal_length..];

        if reader.is_empty() {
            break;
        }

        let offset = reader.read_u16::<LE>().map_err(|_| Error::UnexpectedEnd)? as usize;
        let match_len = read_lsic(token & 0xF, &mut reader)?.saturating_add(MINMATCH);
        if match_len > limit - output.len() {
            throw!(Error::OutputTooLarge(max_output));
        }
        copy_overlapping(offset, match_len, prefix, output)?;
    }
}

#[throws]
fn copy_overlapping(offset: usize, match_len: usize, prefix: &[u8], output: &mut Vec<u8>) {
    let old_len = output.len();
    match offset {
        0 => throw!(Error::ZeroOffset),
        i if i > old_len => {
            // need prefix for this
            let prefix_needed = i - old_len;
            if prefix_needed > prefix.len() {
                throw!(Error::InvalidDeduplicationOffset(prefix_needed - prefix.len()));
            }
            let how_many_bytes_from_prefix = std::cmp::min(prefix_needed, match_len);
            output.extend_from_slice(&prefix[prefix.len() - prefix_needed..][..how_many_bytes_from_prefix]);
            let remaining_len = match_len - how_many_bytes_from_prefix;
            if remaining_len != 0 {
                // offset stays the same because our cursor moved forward by the amount of bytes we took from prefix
                copy_overlapping(offset, remaining_len, &[], output)?;
            }
        }

        // memset if we repeat the same byte forever
        1 => output.resize(old_len + match_len, output[old_len - 1]),

        o if match_len <= o => {
            // nonoverlapping, extend with zeroes first and then memcpy for borrowck reasons
            output.resize(old_len + match_len, 0);
            let (head, tail) = output.split_at_mut(old_len);
            tail.copy_from_slice(&head[old_len - offset..][..match_len]);
        }
        2 | 4 | 8 => {
            // overlapping but small: build a 16 byte pattern and copy that
            let mut buf = [0u8; 16];
            for chunk in buf.chunks_mut(offset) {
                chunk.copy_from_slice(&output[old_len - offset..][..offset]);
            }
            output.resize(old_len + match_len, 0);
            for target in output[old_len..].chunks_mut(buf.len()) {
                target.copy_from_slice(&buf[..target.len()]);
            }
        }
        _ => {
            output.reserve(match_len);
            for i in 0..match_len {
                let b = output[old_len - offset + i];
                output.push(b);
            }
        }
    }
}

/// Decompress a whole block that decompresses to at most `max_output` bytes.
#[throws]
pub fn decompress_block(input: &[u8], max_output: usize) -> Vec<u8> {
    let mut output = Vec::new();
    decompress_into(input, &[], &mut output, max_output)?;
    output
}

/// Like [`decompress_block`], but matches may reach back into `prefix`.
#[throws]
pub fn decompress_block_with_prefix(input: &[u8], prefix: &[u8], max_output: usize) -> Vec<u8> {
    let mut output = Vec::new();
    decompress_into(input, prefix, &mut output, max_output)?;
    output
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aaaaaaaaaaa_lots_of_aaaaaaaaa() {
        assert_eq!(decompress_block(&[0x11, b'a', 1, 0], 100).unwrap(), b"aaaaaa");
    }

    #[test]
    fn multiple_repeated_blocks() {
        assert_eq!(
            decompress_block(&[0x11, b'a', 1, 0, 0x22, b'b', b'c', 2, 0], 100).unwrap(),
            b"aaaaaabcbcbcbc"
        );
    }

    #[test]
    fn all_literal() {
        assert_eq!(decompress_block(&[0x30, b'a', b'4', b'9'], 3).unwrap(), b"a49");
    }

    #[test]
    fn offset_oob() {
        assert_eq!(decompress_block(&[0x10, b'a', 2, 0], 100), Err(DecodeError::InvalidDeduplicationOffset(1)));
        assert_eq!(decompress_block(&[0x40, b'a', 1, 0], 100), Err(DecodeError::UnexpectedEnd));
        assert_eq!(decompress_block(&[0x10, b'a', 0, 0], 100), Err(DecodeError::ZeroOffset));
    }

    #[test]
    fn truncated_sequences() {
        // offset cut in half
        assert_eq!(decompress_block(&[0x11, b'a', 1], 100), Err(DecodeError::UnexpectedEnd));
        // literal length continuation missing
        assert_eq!(decompress_block(&[0xF0], 100), Err(DecodeError::UnexpectedEnd));
    }

    #[test]
    fn output_is_bounded() {
        assert_eq!(decompress_block(&[0x11, b'a', 1, 0], 5), Err(DecodeError::OutputTooLarge(5)));
        assert_eq!(decompress_block(&[0x30, b'a', b'4', b'9'], 2), Err(DecodeError::OutputTooLarge(2)));
    }

    #[test]
    fn prefix_is_used_for_early_offsets() {
        let out = decompress_block_with_prefix(&[0x04, 3, 0, 0x10, b'!'], b"xyz", 100).unwrap();
        assert_eq!(out, b"xyzxyzxy!");
    }
}
