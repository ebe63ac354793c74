#![allow(non_upper_case_globals)]

use std::io::Read;
use byteorder::{LE, ReadBytesExt};
use bitflags::bitflags;
use fehler::{throw, throws};
use thiserror::Error;
use tracing::debug;

use super::{xxh32, LEGACY_BLOCK_MAXSIZE, LEGACY_MAGIC, MAGIC};
use super::decompress::DecompressionError;

bitflags! {
    /// The FLG byte of a frame header, minus the version bits.
    pub struct Flags: u8 {
        const IndependentBlocks = 0b00100000;
        const BlockChecksums    = 0b00010000;
        const ContentSize       = 0b00001000;
        const ContentChecksum   = 0b00000100;
        const DictionaryId      = 0b00000001;
    }
}

const VERSION: u8 = 1;

/// Errors in the two descriptor bytes of a frame header.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("at the time of writing this, the format says block size code {0} is reserved")]
    UnimplementedBlocksize(u8),
    #[error("frame version {0} not supported")]
    UnsupportedVersion(u8),
    #[error("reserved bits in flags set")]
    ReservedFlagBitsSet,
    #[error("reserved bits in block descriptor set")]
    ReservedBdBitsSet,
}

impl Flags {
    #[throws(ParseError)]
    pub fn parse(i: u8) -> Self {
        let version = i >> 6;
        if version != VERSION {
            throw!(ParseError::UnsupportedVersion(version));
        }
        if (i & 0b10) != 0 {
            throw!(ParseError::ReservedFlagBitsSet);
        }

        Flags::from_bits_truncate(i)
    }

    /// The FLG byte including the version bits.
    pub fn to_byte(self) -> u8 { (VERSION << 6) | self.bits() }

    pub fn independent_blocks(&self) -> bool { self.contains(Flags::IndependentBlocks) }
    pub fn block_checksums(&self)    -> bool { self.contains(Flags::BlockChecksums) }
    pub fn content_size(&self)       -> bool { self.contains(Flags::ContentSize) }
    pub fn content_checksum(&self)   -> bool { self.contains(Flags::ContentChecksum) }
    pub fn dictionary_id(&self)      -> bool { self.contains(Flags::DictionaryId) }
}

/// Maximum size of the decompressed data in a block, stored in the BD byte of a frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockSize {
    Max64KiB = 4,
    Max256KiB = 5,
    Max1MiB = 6,
    Max4MiB = 7,
}

impl BlockSize {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            4 => Some(BlockSize::Max64KiB),
            5 => Some(BlockSize::Max256KiB),
            6 => Some(BlockSize::Max1MiB),
            7 => Some(BlockSize::Max4MiB),
            _ => None,
        }
    }

    pub fn code(self) -> u8 { self as u8 }

    /// 64 KiB, 256 KiB, 1 MiB or 4 MiB.
    pub fn bytes(self) -> usize { 1 << (self.code() * 2 + 8) }

    #[throws(ParseError)]
    fn parse_bd(i: u8) -> Self {
        if (i & 0b10001111) != 0 {
            throw!(ParseError::ReservedBdBitsSet);
        }
        let code = (i >> 4) & 0b111;
        match BlockSize::from_code(code) {
            Some(size) => size,
            None => throw!(ParseError::UnimplementedBlocksize(code)),
        }
    }

    fn bd_byte(self) -> u8 { self.code() << 4 }
}

impl Default for BlockSize {
    fn default() -> Self { BlockSize::Max4MiB }
}

/// Which of the two stream layouts a stream uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    /// The current frame format, starting with `0x184D2204`.
    Frame,
    /// The old header-less block stream, starting with `0x184C2102`. Read-only.
    Legacy,
}

/// Everything the header of a stream says about it.
///
/// Built once when an encoder is created or parsed once when a decoder is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    format: StreamFormat,
    flags: Flags,
    block_size: Option<BlockSize>,
    stream_size: Option<u64>,
    dictionary_id: Option<u32>,
}

impl FrameDescriptor {
    pub(crate) fn frame(mut flags: Flags, block_size: BlockSize, stream_size: Option<u64>) -> Self {
        flags.set(Flags::ContentSize, stream_size.is_some());
        flags.remove(Flags::DictionaryId);
        FrameDescriptor {
            format: StreamFormat::Frame,
            flags,
            block_size: Some(block_size),
            stream_size,
            dictionary_id: None,
        }
    }

    pub(crate) fn legacy() -> Self {
        FrameDescriptor {
            format: StreamFormat::Legacy,
            flags: Flags::IndependentBlocks,
            block_size: None,
            stream_size: None,
            dictionary_id: None,
        }
    }

    pub fn format(&self) -> StreamFormat { self.format }
    pub fn is_legacy(&self) -> bool { self.format == StreamFormat::Legacy }

    /// 1 for frames, -1 for legacy streams (which carry no version field).
    pub fn version(&self) -> i8 {
        match self.format {
            StreamFormat::Frame => VERSION as i8,
            StreamFormat::Legacy => -1,
        }
    }

    pub fn flags(&self) -> Flags { self.flags }
    pub fn block_independence(&self) -> bool { self.flags.independent_blocks() }
    pub fn block_checksum(&self) -> bool { self.flags.block_checksums() }
    pub fn stream_checksum(&self) -> bool { self.flags.content_checksum() }
    pub fn stream_size_present(&self) -> bool { self.flags.content_size() }
    pub fn preset_dictionary_present(&self) -> bool { self.flags.dictionary_id() }

    /// `None` for legacy streams, whose block size is fixed at 8 MiB.
    pub fn block_size(&self) -> Option<BlockSize> { self.block_size }

    /// Upper bound of the decompressed size of every block.
    pub fn block_maxsize(&self) -> usize {
        self.block_size.map_or(LEGACY_BLOCK_MAXSIZE, BlockSize::bytes)
    }

    pub fn stream_size(&self) -> Option<u64> { self.stream_size }
    pub fn dictionary_id(&self) -> Option<u32> { self.dictionary_id }

    /// The serialized frame header, magic number and header checksum included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(19);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.push(self.flags.to_byte());
        header.push(self.block_size.unwrap_or_default().bd_byte());
        if let Some(size) = self.stream_size {
            header.extend_from_slice(&size.to_le_bytes());
        }
        if let Some(id) = self.dictionary_id {
            header.extend_from_slice(&id.to_le_bytes());
        }

        // skip magic for header checksum
        let checksum = (xxh32(&header[4..]) >> 8) as u8;
        header.push(checksum);
        header
    }
}

/// Read a stream header: either a complete frame descriptor or just the legacy magic number.
#[throws(DecompressionError)]
pub(crate) fn read_header<R: Read>(reader: &mut R) -> FrameDescriptor {
    let magic = reader.read_u32::<LE>()?;
    match magic {
        MAGIC => {}
        LEGACY_MAGIC => {
            debug!("legacy stream header");
            return FrameDescriptor::legacy();
        }
        other => throw!(DecompressionError::WrongMagic(other)),
    }

    let flags_byte = reader.read_u8()?;
    let flags = Flags::parse(flags_byte)?;
    let bd_byte = reader.read_u8()?;
    let block_size = BlockSize::parse_bd(bd_byte)?;

    let mut described = vec![flags_byte, bd_byte];

    let stream_size = if flags.content_size() {
        let i = reader.read_u64::<LE>()?;
        described.extend_from_slice(&i.to_le_bytes());
        Some(i)
    } else {
        None
    };

    let dictionary_id = if flags.dictionary_id() {
        let i = reader.read_u32::<LE>()?;
        described.extend_from_slice(&i.to_le_bytes());
        Some(i)
    } else {
        None
    };

    let header_checksum_desired = reader.read_u8()?;
    let header_checksum_actual = (xxh32(&described) >> 8) as u8;
    if header_checksum_desired != header_checksum_actual {
        throw!(DecompressionError::HeaderChecksumFail);
    }

    if let Some(id) = dictionary_id {
        throw!(DecompressionError::DictionaryUnsupported(id));
    }

    debug!(
        block_maxsize = block_size.bytes(),
        independent_blocks = flags.independent_blocks(),
        block_checksums = flags.block_checksums(),
        content_checksum = flags.content_checksum(),
        content_size = ?stream_size,
        "parsed frame header"
    );

    FrameDescriptor {
        format: StreamFormat::Frame,
        flags,
        block_size: Some(block_size),
        stream_size,
        dictionary_id,
    }
}
