//! Independent and dependent block compression.
//!
//! Independent blocks are compressed and decompressed in isolation. Dependent blocks may reference
//! up to 64 KiB of the data that came before them, so both sides keep that much history around.

use fehler::throws;

use crate::raw::{decompress_into, BoundedWriter, CompressionLevel, Engine};
use super::WINDOW_SIZE;
use super::decompress::DecompressionError;

pub(crate) enum BlockCompressor {
    Independent(Engine),
    Dependent {
        engine: Engine,
        /// The window of previous data followed by the block being compressed.
        history: Vec<u8>,
    },
}

impl BlockCompressor {
    pub(crate) fn new(level: CompressionLevel, independent: bool) -> Self {
        let engine = Engine::new(level);
        if independent {
            BlockCompressor::Independent(engine)
        } else {
            BlockCompressor::Dependent { engine, history: Vec::new() }
        }
    }

    /// Compress `raw` into `out`, returning the compressed length if it is strictly smaller than
    /// `raw`. `None` means the block has to be stored as it is.
    pub(crate) fn compress(&mut self, raw: &[u8], out: &mut [u8]) -> Option<usize> {
        let limit = raw.len().saturating_sub(1).min(out.len());
        let mut writer = BoundedWriter(&mut out[..limit]);

        let result = match self {
            BlockCompressor::Independent(engine) => {
                engine.reset();
                engine.compress(raw, 0, &mut writer)
            }
            BlockCompressor::Dependent { engine, history } => {
                let cursor = history.len();
                history.extend_from_slice(raw);
                let result = engine.compress(history, cursor, &mut writer);

                if history.len() > WINDOW_SIZE {
                    let forget = history.len() - WINDOW_SIZE;
                    history.drain(..forget);
                    engine.slide(forget);
                }
                result
            }
        };

        // an error here only ever means the bounded output overflowed
        result.ok().map(|()| limit - writer.remaining())
    }
}

pub(crate) enum BlockDecompressor {
    Independent,
    Dependent {
        /// The last (up to) 64 KiB of decompressed data.
        window: Vec<u8>,
    },
}

impl BlockDecompressor {
    pub(crate) fn new(independent: bool) -> Self {
        if independent {
            BlockDecompressor::Independent
        } else {
            BlockDecompressor::Dependent { window: Vec::with_capacity(WINDOW_SIZE) }
        }
    }

    /// Replace the contents of `output` with the decoded block.
    #[throws(DecompressionError)]
    pub(crate) fn decode(&mut self, payload: &[u8], compressed: bool, output: &mut Vec<u8>, block_maxsize: usize) {
        output.clear();
        if compressed {
            let prefix = match self {
                BlockDecompressor::Independent => &[][..],
                BlockDecompressor::Dependent { window } => &window[..],
            };
            decompress_into(payload, prefix, output, block_maxsize)?;
        } else {
            output.extend_from_slice(payload);
        }

        if let BlockDecompressor::Dependent { window } = self {
            if output.len() >= WINDOW_SIZE {
                window.clear();
                window.extend_from_slice(&output[output.len() - WINDOW_SIZE..]);
            } else {
                let keep = WINDOW_SIZE - output.len();
                if window.len() > keep {
                    let forget = window.len() - keep;
                    window.drain(..forget);
                }
                window.extend_from_slice(output);
            }
        }
    }
}
