use std::hash::Hasher;
use std::io::{self, ErrorKind, Write};
use std::mem;
use twox_hash::XxHash32;
use thiserror::Error;
use fehler::{throw, throws};
use tracing::{debug, trace, warn};

use crate::raw::CompressionLevel;
use super::block::{write_block, write_end_mark};
use super::codec::BlockCompressor;
use super::header::FrameDescriptor;
use super::options::{CompressionSettings, ConfigError};

/// Errors when compressing an LZ4 frame.
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("invalid compression settings")]
    Config(#[from] ConfigError),
    #[error("error writing to the output you gave me")]
    WriteError(#[from] io::Error),
    #[error("the encoder is already closed")]
    Closed,
    #[error("the frame header announced {declared} bytes but {actual} were written")]
    StreamSizeMismatch { declared: u64, actual: u64 },
}
type Error = CompressionError; // do it this way for better docs

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::WriteError(e) => e,
            e => io::Error::new(ErrorKind::Other, e),
        }
    }
}

/// Writes an LZ4 frame to a sink.
///
/// Data is collected until a full block is available, so block boundaries only depend on the total
/// number of bytes written and never on how the data was split into calls.
///
/// The frame is only complete once [`close`](Self::close) (or [`finish`](Self::finish)) wrote the
/// end mark. Dropping an open encoder closes it as well, but errors are then only logged.
pub struct LZ4FrameEncoder<W: Write> {
    sink: Option<W>,
    descriptor: FrameDescriptor,
    compressor: BlockCompressor,
    block_maxsize: usize,
    buffer: Vec<u8>,
    out_buffer: Vec<u8>,
    content_hasher: Option<XxHash32>,
    bytes_in: u64,
    bytes_out: u64,
}

impl<W: Write> LZ4FrameEncoder<W> {
    /// Validate `settings` and write the frame header.
    #[throws]
    pub fn new(mut sink: W, level: impl Into<CompressionLevel>, settings: &CompressionSettings) -> Self {
        let level = level.into();
        let descriptor = settings.descriptor()?;
        let header = descriptor.to_bytes();
        sink.write_all(&header)?;

        let block_maxsize = descriptor.block_maxsize();
        debug!(
            level = level.get(),
            block_maxsize,
            independent_blocks = descriptor.block_independence(),
            block_checksums = descriptor.block_checksum(),
            content_checksum = descriptor.stream_checksum(),
            content_size = ?descriptor.stream_size(),
            "wrote frame header"
        );

        LZ4FrameEncoder {
            sink: Some(sink),
            compressor: BlockCompressor::new(level, descriptor.block_independence()),
            content_hasher: if descriptor.stream_checksum() { Some(XxHash32::with_seed(0)) } else { None },
            descriptor,
            block_maxsize,
            buffer: Vec::new(),
            out_buffer: Vec::new(),
            bytes_in: 0,
            bytes_out: header.len() as u64,
        }
    }

    pub fn descriptor(&self) -> &FrameDescriptor { &self.descriptor }

    /// Number of uncompressed bytes accepted so far.
    pub fn bytes_in(&self) -> u64 { self.bytes_in }

    /// Number of bytes handed to the sink so far, header included.
    pub fn bytes_out(&self) -> u64 { self.bytes_out }

    pub fn is_closed(&self) -> bool { self.sink.is_none() }

    /// The sink, unless the encoder has been closed.
    pub fn get_ref(&self) -> Option<&W> { self.sink.as_ref() }

    /// Append `data` to the frame, returning the number of bytes taken (always all of them).
    ///
    /// Full blocks are compressed and written right away, the rest is kept until more data
    /// arrives or the encoder is closed.
    #[throws]
    pub fn write_chunk(&mut self, mut data: &[u8]) -> usize {
        if self.sink.is_none() {
            throw!(Error::Closed);
        }

        let total = data.len();
        while !data.is_empty() {
            let take = (self.block_maxsize - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            self.bytes_in += take as u64;

            if self.buffer.len() == self.block_maxsize {
                self.emit_block()?;
            }
        }
        total
    }

    #[throws]
    fn emit_block(&mut self) {
        let sink = match self.sink.as_mut() {
            Some(sink) => sink,
            None => throw!(Error::Closed),
        };
        let mut raw = mem::take(&mut self.buffer);

        if let Some(hasher) = self.content_hasher.as_mut() {
            hasher.write(&raw);
        }

        if self.out_buffer.len() < raw.len() {
            self.out_buffer.resize(raw.len(), 0);
        }
        let (payload, compressed) = match self.compressor.compress(&raw, &mut self.out_buffer) {
            Some(len) => (&self.out_buffer[..len], true),
            None => (&raw[..], false),
        };

        let block_checksum = self.descriptor.block_checksum();
        write_block(sink, payload, compressed, block_checksum)?;
        trace!(raw = raw.len(), stored = payload.len(), compressed, "wrote block");
        self.bytes_out += (4 + payload.len() + if block_checksum { 4 } else { 0 }) as u64;

        // keep the allocation for the next block
        raw.clear();
        self.buffer = raw;
    }

    #[throws]
    fn end_frame(&mut self) {
        if self.sink.is_none() {
            throw!(Error::Closed);
        }
        if !self.buffer.is_empty() {
            self.emit_block()?;
        }

        if let Some(declared) = self.descriptor.stream_size() {
            if declared != self.bytes_in {
                throw!(Error::StreamSizeMismatch { declared, actual: self.bytes_in });
            }
        }

        let checksum = self.content_hasher.take().map(|hasher| hasher.finish() as u32);
        if let Some(sink) = self.sink.as_mut() {
            write_end_mark(sink, checksum)?;
            sink.flush()?;
        }
        self.bytes_out += if checksum.is_some() { 8 } else { 4 };
    }

    /// Write the last block, the end mark and the content checksum, flush the sink and hand it back.
    ///
    /// The encoder is closed afterwards even if this fails: any later call returns
    /// [`CompressionError::Closed`].
    #[throws]
    pub fn close(&mut self) -> W {
        let result = self.end_frame();
        match (result, self.sink.take()) {
            (Ok(()), Some(sink)) => {
                debug!(bytes_in = self.bytes_in, bytes_out = self.bytes_out, "closed frame");
                sink
            }
            (Err(e), _) => throw!(e),
            (Ok(()), None) => throw!(Error::Closed),
        }
    }

    /// Like [`close`](Self::close), but consumes the encoder.
    #[throws]
    pub fn finish(mut self) -> W {
        self.close()?
    }
}

impl<W: Write> Write for LZ4FrameEncoder<W> {
    #[throws(io::Error)]
    fn write(&mut self, buf: &[u8]) -> usize {
        self.write_chunk(buf)?
    }

    /// Flushes the sink. Buffered data stays buffered until a block is full, so this never
    /// changes the output.
    #[throws(io::Error)]
    fn flush(&mut self) {
        match self.sink.as_mut() {
            Some(sink) => sink.flush()?,
            None => throw!(io::Error::from(Error::Closed)),
        }
    }
}

impl<W: Write> Drop for LZ4FrameEncoder<W> {
    fn drop(&mut self) {
        if self.sink.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "closing the LZ4 frame encoder on drop failed");
            }
        }
    }
}
