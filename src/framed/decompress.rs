use std::cmp;
use std::hash::Hasher;
use std::io::{self, BufRead, ErrorKind, Read};
use twox_hash::XxHash32;
use thiserror::Error;
use fehler::{throw, throws};
use tracing::{debug, trace};

use crate::raw;
use super::block::{read_block, read_content_checksum, read_legacy_block};
use super::codec::BlockDecompressor;
use super::header::{self, FrameDescriptor};

/// Errors when decompressing an LZ4 frame.
#[derive(Error, Debug)]
pub enum DecompressionError {
    #[error("error reading from the input you gave me")]
    InputError(#[from] io::Error),
    #[error("the raw LZ4 decompression failed (data corruption?)")]
    CodecError(#[from] raw::DecodeError),
    #[error("invalid header")]
    HeaderParseError(#[from] header::ParseError),
    #[error("wrong magic number in file header: {0:08x}")]
    WrongMagic(u32),
    #[error("the header checksum was invalid")]
    HeaderChecksumFail,
    #[error("a block checksum was invalid")]
    BlockChecksumFail,
    #[error("the frame checksum was invalid")]
    FrameChecksumFail,
    #[error("block of {size} bytes is larger than the maximum of {max} (stream damaged?)")]
    BlockTooBig { size: usize, max: usize },
    #[error("expected {needed} more bytes of a block but the input ended after {got}")]
    TruncatedBlock { needed: usize, got: usize },
    #[error("the input ended before the end of the frame")]
    UnexpectedEnd,
    #[error("the frame needs dictionary {0:#x}, which is not supported")]
    DictionaryUnsupported(u32),
    #[error("the frame header announced {declared} bytes but the frame holds {actual}")]
    StreamSizeMismatch { declared: u64, actual: u64 },
    #[error("the decoder is already closed")]
    Closed,
}
type Error = DecompressionError; // do it this way for better docs

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::InputError(e) => e,
            e => io::Error::new(ErrorKind::InvalidData, e),
        }
    }
}

/// Read an LZ4-compressed frame.
///
/// This reader reads the blocks inside a frame one by one. Streams in the legacy format are read
/// the same way, they just never have checksums.
pub struct LZ4FrameReader<R: Read> {
    reader: R,
    descriptor: FrameDescriptor,
    decompressor: BlockDecompressor,
    read_buf: Vec<u8>,
    content_hasher: Option<XxHash32>,
    bytes_out: u64,
    finished: bool,
}

impl<R: Read> LZ4FrameReader<R> {
    /// Read and verify the stream header.
    #[throws]
    pub fn new(mut reader: R) -> Self {
        let descriptor = header::read_header(&mut reader)?;

        LZ4FrameReader {
            reader,
            decompressor: BlockDecompressor::new(descriptor.block_independence()),
            content_hasher: if descriptor.stream_checksum() { Some(XxHash32::with_seed(0)) } else { None },
            descriptor,
            read_buf: Vec::new(),
            bytes_out: 0,
            finished: false,
        }
    }

    pub fn descriptor(&self) -> &FrameDescriptor { &self.descriptor }
    pub fn block_size(&self) -> usize { self.descriptor.block_maxsize() }
    pub fn frame_size(&self) -> Option<u64> { self.descriptor.stream_size() }

    /// True once the end of the frame has been reached and verified.
    pub fn is_finished(&self) -> bool { self.finished }

    pub fn into_decoder(self) -> LZ4FrameDecoder<R> {
        LZ4FrameDecoder {
            descriptor: self.descriptor.clone(),
            buffer: Vec::new(),
            taken: 0,
            exhausted: false,
            frame: Some(self),
        }
    }

    pub fn into_inner(self) -> R { self.reader }

    /// Replace the contents of `output` with the next block.
    ///
    /// Returns `false` (and leaves `output` empty) at the end of the frame, after the content
    /// checksum and the content size have been verified.
    #[throws]
    pub fn decode_block(&mut self, output: &mut Vec<u8>) -> bool {
        output.clear();
        if self.finished {
            return false;
        }

        let block_maxsize = self.descriptor.block_maxsize();
        let compressed = if self.descriptor.is_legacy() {
            if !read_legacy_block(&mut self.reader, &mut self.read_buf)? {
                self.finished = true;
                debug!(bytes_out = self.bytes_out, "end of legacy stream");
                return false;
            }
            true
        } else {
            match read_block(&mut self.reader, block_maxsize, self.descriptor.block_checksum(), &mut self.read_buf)? {
                Some(compressed) => compressed,
                None => {
                    self.end_frame()?;
                    return false;
                }
            }
        };

        self.decompressor.decode(&self.read_buf, compressed, output, block_maxsize)?;
        trace!(stored = self.read_buf.len(), raw = output.len(), compressed, "read block");

        if let Some(hasher) = self.content_hasher.as_mut() {
            hasher.write(output);
        }
        self.bytes_out += output.len() as u64;
        true
    }

    #[throws]
    fn end_frame(&mut self) {
        self.finished = true;

        if let Some(hasher) = self.content_hasher.take() {
            let checksum = read_content_checksum(&mut self.reader)?;
            if hasher.finish() != checksum.into() {
                throw!(Error::FrameChecksumFail);
            }
        }

        if let Some(declared) = self.descriptor.stream_size() {
            if declared != self.bytes_out {
                throw!(Error::StreamSizeMismatch { declared, actual: self.bytes_out });
            }
        }

        debug!(bytes_out = self.bytes_out, "end of frame");
    }
}

/// Sequential reader over the decompressed content of a frame.
///
/// Keeps the rest of the most recently decoded block around, so reads of any size can be served.
/// Also implements `Read` and `BufRead`.
pub struct LZ4FrameDecoder<R: Read> {
    frame: Option<LZ4FrameReader<R>>,
    descriptor: FrameDescriptor,
    buffer: Vec<u8>,
    taken: usize,
    exhausted: bool,
}

impl<R: Read> LZ4FrameDecoder<R> {
    #[throws]
    pub fn new(source: R) -> Self {
        LZ4FrameReader::new(source)?.into_decoder()
    }

    /// The header of the stream. Still available after closing.
    pub fn descriptor(&self) -> &FrameDescriptor { &self.descriptor }

    /// Make sure there is something unread in `buffer`, `false` at the end of the stream.
    #[throws]
    fn fill(&mut self) -> bool {
        let frame = match self.frame.as_mut() {
            Some(frame) => frame,
            None => throw!(Error::Closed),
        };
        while self.taken == self.buffer.len() {
            if self.exhausted {
                return false;
            }
            self.taken = 0;
            if !frame.decode_block(&mut self.buffer)? {
                self.exhausted = true;
            }
        }
        true
    }

    /// Everything up to the end of the stream.
    #[throws]
    pub fn read_all(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while self.fill()? {
            out.extend_from_slice(&self.buffer[self.taken..]);
            self.taken = self.buffer.len();
        }
        out
    }

    /// Up to `n` bytes, fewer only at the end of the stream.
    ///
    /// `None` means the stream has ended and nothing was left to read. Asking for zero bytes
    /// always gives an empty vector without touching the source, even after closing.
    #[throws]
    pub fn read_part(&mut self, n: usize) -> Option<Vec<u8>> {
        if n == 0 {
            return Some(Vec::new());
        }

        let mut out = Vec::with_capacity(cmp::min(n, self.descriptor.block_maxsize()));
        while out.len() < n && self.fill()? {
            let available = &self.buffer[self.taken..];
            let take = cmp::min(available.len(), n - out.len());
            out.extend_from_slice(&available[..take]);
            self.taken += take;
        }

        if out.is_empty() { None } else { Some(out) }
    }

    /// The next byte, `None` at the end of the stream.
    #[throws]
    pub fn read_byte(&mut self) -> Option<u8> {
        if !self.fill()? {
            return None;
        }
        let byte = self.buffer[self.taken];
        self.taken += 1;
        Some(byte)
    }

    /// Whether everything has been read. May need to decode the next block to find out.
    #[throws]
    pub fn is_eof(&mut self) -> bool {
        !self.fill()?
    }

    /// Detach the source and hand it back. Every later read fails with
    /// [`DecompressionError::Closed`].
    pub fn close(&mut self) -> Option<R> {
        self.buffer = Vec::new();
        self.taken = 0;
        self.frame.take().map(LZ4FrameReader::into_inner)
    }

    pub fn is_closed(&self) -> bool { self.frame.is_none() }

    /// The source, unless the decoder has been closed.
    pub fn into_inner(mut self) -> Option<R> {
        self.close()
    }
}

impl<R: Read> Read for LZ4FrameDecoder<R> {
    #[throws(io::Error)]
    fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let mybuf = self.fill_buf()?;
        let bytes_to_take = cmp::min(mybuf.len(), buf.len());
        buf[..bytes_to_take].copy_from_slice(&mybuf[..bytes_to_take]);
        self.consume(bytes_to_take);
        bytes_to_take
    }
}

impl<R: Read> BufRead for LZ4FrameDecoder<R> {
    #[throws(io::Error)]
    fn fill_buf(&mut self) -> &[u8] {
        // empty at the end of the stream
        self.fill()?;
        &self.buffer[self.taken..]
    }

    fn consume(&mut self, amt: usize) {
        self.taken += amt;
        assert!(self.taken <= self.buffer.len(), "You consumed more bytes than I even gave you!");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framed::block::{write_block, write_end_mark};
    use crate::framed::header::{BlockSize, Flags};
    use crate::framed::xxh32;

    fn frame(flags: Flags, stream_size: Option<u64>, blocks: &[&[u8]], checksum: Option<u32>) -> Vec<u8> {
        let mut out = FrameDescriptor::frame(flags, BlockSize::Max64KiB, stream_size).to_bytes();
        for block in blocks {
            write_block(&mut out, block, false, flags.block_checksums()).unwrap();
        }
        write_end_mark(&mut out, checksum).unwrap();
        out
    }

    fn hello() -> Vec<u8> {
        frame(Flags::IndependentBlocks | Flags::ContentChecksum, None, &[b"hello ", b"world"], Some(xxh32(b"hello world")))
    }

    #[test]
    fn literal_blocks() {
        let data = hello();
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        assert_eq!(decoder.read_all().unwrap(), b"hello world");
        assert!(decoder.is_eof().unwrap());
        assert_eq!(decoder.read_part(3).unwrap(), None);
    }

    #[test]
    fn partial_reads_cross_blocks() {
        let data = hello();
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        assert_eq!(decoder.read_part(0).unwrap(), Some(Vec::new()));
        assert_eq!(decoder.read_part(4).unwrap().unwrap(), b"hell");
        assert_eq!(decoder.read_part(4).unwrap().unwrap(), b"o wo");
        assert_eq!(decoder.read_byte().unwrap(), Some(b'r'));
        assert!(!decoder.is_eof().unwrap());
        assert_eq!(decoder.read_part(100).unwrap().unwrap(), b"ld");
        assert_eq!(decoder.read_byte().unwrap(), None);
    }

    #[test]
    fn io_traits() {
        let data = hello();
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn buffered_reads_end_with_an_empty_buffer() {
        let data = hello();
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        assert_eq!(decoder.fill_buf().unwrap(), b"hello ");
        decoder.consume(6);
        assert_eq!(decoder.fill_buf().unwrap(), b"world");
        decoder.consume(5);
        assert!(decoder.fill_buf().unwrap().is_empty());
        assert!(decoder.fill_buf().unwrap().is_empty());
        assert_eq!(decoder.read(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn closed_decoder() {
        let data = hello();
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        assert!(decoder.close().is_some());
        assert!(decoder.is_closed());
        assert!(decoder.close().is_none());
        assert!(matches!(decoder.read_all(), Err(DecompressionError::Closed)));
        assert!(matches!(decoder.read_byte(), Err(DecompressionError::Closed)));
        assert_eq!(decoder.read_part(0).unwrap(), Some(Vec::new()));
        assert!(decoder.read(&mut [0u8; 4]).is_err());
        assert!(decoder.descriptor().stream_checksum());
    }

    #[test]
    fn content_checksum_is_verified() {
        let mut data = hello();
        let last = data.len() - 1;
        data[last] ^= 0x40;
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        assert!(matches!(decoder.read_all(), Err(DecompressionError::FrameChecksumFail)));
    }

    #[test]
    fn block_checksums_are_verified() {
        let flags = Flags::IndependentBlocks | Flags::BlockChecksums;
        let mut data = frame(flags, None, &[b"checked"], None);
        assert_eq!(LZ4FrameDecoder::new(&data[..]).unwrap().read_all().unwrap(), b"checked");

        // damage the payload, not the checksum
        data[7 + 4] = b'C';
        let result = LZ4FrameDecoder::new(&data[..]).unwrap().read_all();
        assert!(matches!(result, Err(DecompressionError::BlockChecksumFail)));
    }

    #[test]
    fn content_size_is_verified() {
        let data = frame(Flags::IndependentBlocks, Some(5), &[b"hello"], None);
        assert_eq!(LZ4FrameDecoder::new(&data[..]).unwrap().read_all().unwrap(), b"hello");

        let data = frame(Flags::IndependentBlocks, Some(6), &[b"hello"], None);
        match LZ4FrameDecoder::new(&data[..]).unwrap().read_all() {
            Err(DecompressionError::StreamSizeMismatch { declared: 6, actual: 5 }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_end_mark() {
        let mut data = hello();
        data.truncate(data.len() - 8);
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        assert!(matches!(decoder.read_all(), Err(DecompressionError::UnexpectedEnd)));
    }

    #[test]
    fn block_reader_reports_each_block() {
        let data = hello();
        let mut reader = LZ4FrameReader::new(&data[..]).unwrap();
        assert_eq!(reader.block_size(), 64 * 1024);
        let mut block = Vec::new();
        assert!(reader.decode_block(&mut block).unwrap());
        assert_eq!(block, b"hello ");
        assert!(reader.decode_block(&mut block).unwrap());
        assert_eq!(block, b"world");
        assert!(!reader.decode_block(&mut block).unwrap());
        assert!(block.is_empty());
        assert!(reader.is_finished());
        assert!(reader.into_inner().is_empty());
    }

    #[test]
    fn legacy_stream() {
        let mut data = vec![0x02, 0x21, 0x4C, 0x18];
        for part in &[&b"legacy "[..], &b"blocks"[..]] {
            let compressed = raw::compress_block(part, raw::CompressionLevel::FAST);
            data.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            data.extend_from_slice(&compressed);
        }
        let mut decoder = LZ4FrameDecoder::new(&data[..]).unwrap();
        assert!(decoder.descriptor().is_legacy());
        assert_eq!(decoder.read_all().unwrap(), b"legacy blocks");
    }
}
