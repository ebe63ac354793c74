//! Raw LZ4 block compression.
//!
//! Two match finders are available. The fast one keeps a single candidate per hash slot and accepts
//! the first match it sees, skipping ahead in growing steps through data that does not compress.
//! The high compression one ([`hc`]) keeps a chain of earlier positions per hash and walks it to find
//! the longest match, trading speed for ratio.
//!
//! Both compress `input[cursor..]` and may reference anything in `input[..cursor]`, which is how
//! dependent blocks see the tail of the previous block.

mod hc;

use std::cmp;
use std::io::{self, ErrorKind, Write};
use std::mem;
use byteorder::{ByteOrder, NativeEndian, WriteBytesExt, LE};
use cfg_if::cfg_if;
use fehler::throws;
use thiserror::Error;

pub(crate) use hc::HashChain;

type Error = io::Error;

/// Every four bytes is assigned an entry. When this number is lower, fewer entries exist, and
/// thus collisions are more likely, hurting the compression ratio.
const TABLE_SIZE: usize = 1 << HASHLOG;
const HASHLOG: usize = 12;

pub(crate) const MINMATCH: usize = 4;
/// No match may start within the last 12 bytes of a block.
pub(crate) const MFLIMIT: usize = 12;
/// The last 5 bytes of a block are always encoded as literals.
pub(crate) const LAST_LITERALS: usize = 5;
/// Offsets are stored as u16.
pub(crate) const MAX_DISTANCE: usize = 0xFFFF;

const ACCELERATION: usize = 1;
const SKIP_TRIGGER: usize = 6; // for each 64 steps, skip in bigger increments

/// Errors when compressing into a bounded destination.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressError {
    #[error("the compressed block does not fit into {0} bytes")]
    OutputTooSmall(usize),
}

/// Compression level as understood by `lz4` tools.
///
/// Levels below 4 select the fast compressor. Levels 4 through 16 select the high compression
/// compressor with a search depth that doubles with every level. Higher levels are clamped to 16.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    pub const FAST: CompressionLevel = CompressionLevel(1);
    pub const MAX: CompressionLevel = CompressionLevel(16);
    /// The first level served by the hash chain compressor.
    pub const HIGH: CompressionLevel = CompressionLevel(4);

    pub fn new(level: i32) -> Self {
        CompressionLevel(cmp::min(level, Self::MAX.0))
    }

    pub fn get(self) -> i32 { self.0 }

    pub fn is_high(self) -> bool { self >= Self::HIGH }

    /// Number of chain entries the high compression match finder may visit per position.
    fn search_depth(self) -> usize {
        let shift = cmp::min(self.0.saturating_sub(1).max(0), 12);
        1usize << shift
    }
}

impl Default for CompressionLevel {
    fn default() -> Self { Self::FAST }
}

impl From<i32> for CompressionLevel {
    fn from(level: i32) -> Self { Self::new(level) }
}

/// Upper bound of the compressed size of `len` input bytes.
pub fn compress_bound(len: usize) -> usize {
    len + len / 255 + 16
}

/// Compress `input` as a single independent block.
pub fn compress_block(input: &[u8], level: CompressionLevel) -> Vec<u8> {
    let mut output = Vec::with_capacity(compress_bound(input.len()));
    // a Vec accepts every write, there is nothing to report
    let _ = Engine::new(level).compress(input, 0, &mut output);
    output
}

/// Compress `input` as a single independent block whose encoding may not exceed `max_output` bytes.
#[throws(CompressError)]
pub fn compress_block_bounded(input: &[u8], level: CompressionLevel, max_output: usize) -> Vec<u8> {
    let mut output = vec![0u8; max_output];
    let mut cursor = BoundedWriter(&mut output[..]);
    if Engine::new(level).compress(input, 0, &mut cursor).is_err() {
        fehler::throw!(CompressError::OutputTooSmall(max_output));
    }
    let written = max_output - cursor.remaining();
    output.truncate(written);
    output
}

/// The match finder state for one of the two compressors.
pub(crate) enum Engine {
    Fast(HashTable),
    High { chain: HashChain, depth: usize },
}

impl Engine {
    pub(crate) fn new(level: CompressionLevel) -> Self {
        if level.is_high() {
            Engine::High { chain: HashChain::new(), depth: level.search_depth() }
        } else {
            Engine::Fast(HashTable::new())
        }
    }

    /// Forget everything, the next block will not reference earlier data.
    pub(crate) fn reset(&mut self) {
        match self {
            Engine::Fast(table) => table.reset(),
            Engine::High { chain, .. } => chain.reset(),
        }
    }

    /// The caller dropped `by` bytes from the front of its input buffer.
    pub(crate) fn slide(&mut self, by: usize) {
        match self {
            Engine::Fast(table) => table.slide(by),
            Engine::High { chain, .. } => chain.slide(by),
        }
    }

    #[throws]
    pub(crate) fn compress<W: Write>(&mut self, input: &[u8], cursor: usize, writer: W) {
        match self {
            Engine::Fast(table) => compress_fast(input, cursor, table, writer)?,
            Engine::High { chain, depth } => hc::compress_hc(input, cursor, chain, *depth, writer)?,
        }
    }
}

/// Single-probe hash table of the fast compressor.
///
/// Slots hold absolute stream positions plus one (zero marks an empty slot). `base` is the absolute
/// position of `input[0]`, so sliding the input never requires touching the table.
pub(crate) struct HashTable {
    slots: Box<[usize]>,
    base: usize,
}

impl HashTable {
    pub(crate) fn new() -> Self {
        HashTable { slots: vec![0; TABLE_SIZE].into_boxed_slice(), base: 0 }
    }

    fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = 0;
        }
        self.base = 0;
    }

    fn slide(&mut self, by: usize) {
        self.base += by;
    }

    /// Store `offset` and return the index previously stored under the same hash, if it is still
    /// inside `input`.
    fn replace(&mut self, input: &[u8], offset: usize) -> Option<usize> {
        let position = offset + self.base;
        let previous = mem::replace(&mut self.slots[hash_position(&input[offset..])], position + 1);
        previous.checked_sub(1)?.checked_sub(self.base)
    }
}

cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        // on 64 bit systems, we read 64 bits and hash 5 bytes instead of 4
        fn hash_position(input: &[u8]) -> usize {
            // the only case where this becomes zero is at the very end, where we're not allowed to
            // produce matches anyway
            let v = input.get(..8).map(NativeEndian::read_u64).unwrap_or(0);

            #[cfg(target_endian = "little")] fn checksum_u64(v: u64) -> u64 { (v << 24).wrapping_mul(889523592379) }
            #[cfg(target_endian = "big")] fn checksum_u64(v: u64) -> u64 { (v >> 24).wrapping_mul(11400714785074694791) }
            (checksum_u64(v) >> (64 - HASHLOG)) as usize
        }
    } else {
        fn hash_position(input: &[u8]) -> usize {
            let v = NativeEndian::read_u32(input);
            (v.wrapping_mul(2654435761) >> (32 - HASHLOG)) as usize
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Duplicate {
    /// The number of bytes before our cursor, where the duplicate starts.
    pub(crate) offset: u16,

    /// The length beyond the four first bytes.
    pub(crate) extra_bytes: usize,
}

pub(crate) fn count_matching_bytes(a: &[u8], b: &[u8]) -> usize {
    const REGSIZE: usize = mem::size_of::<usize>();
    fn read_usize(b: &[u8]) -> usize {
        let mut buf = [0u8; REGSIZE];
        buf.copy_from_slice(&b[..REGSIZE]);
        usize::from_le_bytes(buf)
    }

    let mut matching_bytes = 0;
    // compare a full register at a time
    for (a, b) in a.chunks_exact(REGSIZE).zip(b.chunks_exact(REGSIZE)) {
        let xor = read_usize(a) ^ read_usize(b);
        if xor != 0 {
            return matching_bytes + (xor.trailing_zeros() / 8) as usize;
        }
        matching_bytes += REGSIZE;
    }

    let trailing_matches = a.iter().zip(b).skip(matching_bytes).take_while(|&(a, b)| a == b).count();
    matching_bytes + trailing_matches
}

#[throws]
pub(crate) fn write_group<W: Write>(writer: &mut W, literal: &[u8], duplicate: Duplicate) {
    let literal_len = literal.len();

    let mut token = 0;
    write_lsic_head(&mut token, 4, literal_len);
    write_lsic_head(&mut token, 0, duplicate.extra_bytes);

    writer.write_u8(token)?;
    write_lsic_tail(writer, literal_len)?;
    writer.write_all(literal)?;
    writer.write_u16::<LE>(duplicate.offset)?;
    write_lsic_tail(writer, duplicate.extra_bytes)?;
}

/// Every block ends with a sequence that has literals only.
#[throws]
pub(crate) fn write_last_literals<W: Write>(writer: &mut W, literal: &[u8]) {
    let mut token = 0;
    write_lsic_head(&mut token, 4, literal.len());
    writer.write_u8(token)?;
    write_lsic_tail(writer, literal.len())?;
    writer.write_all(literal)?;
}

fn write_lsic_head(token: &mut u8, shift: usize, value: usize) {
    let i = cmp::min(value, 0xF) as u8;
    *token |= i << shift;
}

#[throws]
fn write_lsic_tail<W: Write>(writer: &mut W, mut value: usize) {
    if value < 0xF {
        return;
    }

    value -= 0xF;

    while value >= 4 * 0xFF {
        writer.write_u32::<NativeEndian>(u32::MAX)?;
        value -= 4 * 0xFF;
    }
    while value >= 0xFF {
        writer.write_u8(0xFF)?;
        value -= 0xFF;
    }
    writer.write_u8(value as u8)?;
}

#[throws]
fn compress_fast<W: Write>(input: &[u8], cursor: usize, table: &mut HashTable, mut writer: W) {
    let init_cursor = cursor;
    let mut cursor = cursor;
    loop {
        let literal_start = cursor;

        let mut step_counter = ACCELERATION << SKIP_TRIGGER;
        let mut step = 1;
        let duplicate = loop {
            if input.len().saturating_sub(cursor) < MFLIMIT {
                write_last_literals(&mut writer, &input[literal_start..])?;
                return;
            }

            // the trailing literals may not take part in a match
            let current_batch = &input[cursor..(input.len() - LAST_LITERALS)];
            let candidate = table.replace(input, cursor);

            // the very first byte never matches, the reference implementation enforces this and we
            // want byte-identical output
            let candidate = candidate
                .filter(|_| cursor != init_cursor)
                .filter(|&c| c < cursor && cursor - c <= MAX_DISTANCE);
            if let Some(candidate) = candidate {
                let matching_bytes = count_matching_bytes(current_batch, &input[candidate..]);

                if let Some(mut extra_bytes) = matching_bytes.checked_sub(MINMATCH) {
                    let offset = (cursor - candidate) as u16;

                    // extend the match backwards into the pending literals
                    let max_backtrack = cursor - literal_start;
                    let backtrack = input[..cursor].iter().rev()
                        .zip(input[..candidate].iter().rev())
                        .take(max_backtrack)
                        .take_while(|&(a, b)| a == b)
                        .count();
                    extra_bytes += backtrack;
                    cursor += matching_bytes;

                    table.replace(input, cursor - 2);

                    break Duplicate { offset, extra_bytes };
                }
            }

            cursor += step;
            step = step_counter >> SKIP_TRIGGER;

            // the first byte of each search doesn't count towards acceleration
            if literal_start + 1 != cursor {
                step_counter += 1
            }
        };

        // cursor is now pointing past the match
        let literal_end = cursor - duplicate.extra_bytes - MINMATCH;
        write_group(&mut writer, &input[literal_start..literal_end], duplicate)?;
    }
}

/// Writer over a fixed slice that refuses any write it cannot take in full.
///
/// The `Write` impl on `[u8]` writes as many bytes as possible before failing, which forces a
/// 32-bit write to compile to four 8-bit writes with a range check each. We throw the buffer away
/// once it overflows anyway, so partial writes are never needed.
pub(crate) struct BoundedWriter<'a>(pub(crate) &'a mut [u8]);

impl<'a> BoundedWriter<'a> {
    pub(crate) fn remaining(&self) -> usize { self.0.len() }
}

impl<'a> Write for BoundedWriter<'a> {
    #[inline]
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.0.len() < data.len() {
            return Err(ErrorKind::WriteZero.into());
        }

        let amt = data.len();
        let (a, b) = mem::replace(&mut self.0, &mut []).split_at_mut(amt);
        a.copy_from_slice(data);
        self.0 = b;
        Ok(amt)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
