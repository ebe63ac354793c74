//! High compression match finder.
//!
//! Instead of one candidate per hash, every inserted position links back to the previous position
//! with the same hash. Searching walks that chain (up to the level's search depth) and keeps the
//! longest match.

use std::io::{self, Write};
use byteorder::{ByteOrder, LE};
use fehler::throws;

use super::{
    count_matching_bytes, write_group, write_last_literals, Duplicate, LAST_LITERALS, MAX_DISTANCE,
    MFLIMIT, MINMATCH,
};

type Error = io::Error;

const HASHLOG: usize = 15;
/// One chain slot per addressable offset.
const CHAIN_SIZE: usize = MAX_DISTANCE + 1;
/// Matches at least this long end the search early.
const GOOD_ENOUGH: usize = 256;

fn hash4(input: &[u8]) -> usize {
    (LE::read_u32(input).wrapping_mul(2654435761) >> (32 - HASHLOG)) as usize
}

/// Hash chain over absolute stream positions.
///
/// `head` holds the most recent position plus one for every hash (zero is empty), `chain` holds
/// the distance from a position to the previous one with the same hash (zero ends the chain).
/// `base` is the absolute position of `input[0]` and `next` the first position not yet inserted.
pub(crate) struct HashChain {
    head: Box<[usize]>,
    chain: Box<[u16]>,
    base: usize,
    next: usize,
}

impl HashChain {
    pub(crate) fn new() -> Self {
        HashChain {
            head: vec![0; 1 << HASHLOG].into_boxed_slice(),
            chain: vec![0; CHAIN_SIZE].into_boxed_slice(),
            base: 0,
            next: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        for slot in self.head.iter_mut() {
            *slot = 0;
        }
        self.base = 0;
        self.next = 0;
    }

    pub(crate) fn slide(&mut self, by: usize) {
        self.base += by;
    }

    /// Insert every position before `index` that has not been inserted yet.
    fn insert_until(&mut self, input: &[u8], index: usize) {
        let target = index + self.base;
        let mut position = self.next.max(self.base);
        while position < target {
            let hash = hash4(&input[position - self.base..]);
            let distance = self.head[hash]
                .checked_sub(1)
                .and_then(|previous| position.checked_sub(previous))
                .filter(|&d| d <= MAX_DISTANCE)
                .unwrap_or(0);
            self.chain[position & MAX_DISTANCE] = distance as u16;
            self.head[hash] = position + 1;
            position += 1;
        }
        self.next = self.next.max(position);
    }

    /// Longest match for `input[index..]` that ends before `match_limit`, as (index, length).
    fn find(&self, input: &[u8], index: usize, match_limit: usize, depth: usize) -> Option<(usize, usize)> {
        let position = index + self.base;
        let current = &input[index..match_limit];
        let mut candidate = self.head[hash4(&input[index..])].checked_sub(1)?;

        let mut best: Option<(usize, usize)> = None;
        for _ in 0..depth {
            if candidate < self.base || candidate >= position || position - candidate > MAX_DISTANCE {
                break;
            }

            let candidate_index = candidate - self.base;
            let len = count_matching_bytes(current, &input[candidate_index..]);
            if len >= MINMATCH && best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((candidate_index, len));
                if len == current.len() || len >= GOOD_ENOUGH {
                    break;
                }
            }

            let distance = self.chain[candidate & MAX_DISTANCE] as usize;
            if distance == 0 {
                break;
            }
            candidate = match candidate.checked_sub(distance) {
                Some(c) => c,
                None => break,
            };
        }
        best
    }
}

#[throws]
pub(crate) fn compress_hc<W: Write>(input: &[u8], cursor: usize, chain: &mut HashChain, depth: usize, mut writer: W) {
    let match_limit = input.len().saturating_sub(LAST_LITERALS);

    let mut anchor = cursor;
    let mut index = cursor;
    while index + MFLIMIT <= input.len() {
        chain.insert_until(input, index);
        match chain.find(input, index, match_limit, depth) {
            Some((candidate, len)) => {
                let duplicate = Duplicate {
                    offset: (index - candidate) as u16,
                    extra_bytes: len - MINMATCH,
                };
                write_group(&mut writer, &input[anchor..index], duplicate)?;
                index += len;
                anchor = index;
            }
            None => index += 1,
        }
    }

    write_last_literals(&mut writer, &input[anchor..])?;
}
