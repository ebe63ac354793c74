use std::str::FromStr;
use fehler::{throw, throws};
use thiserror::Error;

use super::header::{BlockSize, Flags, FrameDescriptor};

/// Every option key understood by [`CompressionSettings::set`].
pub const OPTION_NAMES: &[&str] = &[
    "legacy",
    "blocksize_code",
    "block_dependency",
    "block_checksum",
    "stream_checksum",
    "stream_size",
];

/// Errors in compression settings. These are always reported before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown option {0:?}")]
    UnknownOption(String),
    #[error("invalid value {value:?} for option {key:?}")]
    InvalidValue { key: String, value: String },
    #[error("block size code {0} is not one of 4, 5, 6 or 7")]
    InvalidBlockSizeCode(u8),
    #[error("writing the legacy format is not supported")]
    LegacyOutputUnsupported,
}
type Error = ConfigError;

/// A builder-style struct that configures how a frame is written.
///
/// Create it using `Default::default()` or parse it from a `key=value,key=value` string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionSettings {
    legacy: bool,
    blocksize_code: u8,
    block_dependency: bool,
    block_checksum: bool,
    stream_checksum: bool,
    stream_size: Option<u64>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            legacy: false,
            blocksize_code: BlockSize::Max4MiB.code(),
            block_dependency: false,
            block_checksum: false,
            stream_checksum: true,
            stream_size: None,
        }
    }
}

impl CompressionSettings {
    /// With block dependency enabled, every block may reference the last 64 KiB of the blocks
    /// before it. This improves compression of small blocks, but a block can then no longer be
    /// decompressed without decompressing everything before it.
    ///
    /// Blocks are independent by default.
    pub fn block_dependency(&mut self, v: bool) -> &mut Self {
        self.block_dependency = v;
        self
    }

    /// Block checksums can help detect data corruption in storage and transit.
    /// They do not offer error correction though.
    ///
    /// Block checksums are disabled by default.
    pub fn block_checksum(&mut self, v: bool) -> &mut Self {
        self.block_checksum = v;
        self
    }

    /// The stream checksum is calculated over the entire decompressed content and written after
    /// the last block. It can only be verified once everything has been read.
    ///
    /// Stream checksums are enabled by default.
    pub fn stream_checksum(&mut self, v: bool) -> &mut Self {
        self.stream_checksum = v;
        self
    }

    /// 4 (64 KiB), 5 (256 KiB), 6 (1 MiB) or 7 (4 MiB). Anything else is rejected when the
    /// encoder is created.
    ///
    /// The default is 7.
    pub fn blocksize_code(&mut self, v: u8) -> &mut Self {
        self.blocksize_code = v;
        self
    }

    pub fn block_size(&mut self, v: BlockSize) -> &mut Self {
        self.blocksize_code = v.code();
        self
    }

    /// Announce the exact number of bytes that will be written in the frame header.
    /// Closing the encoder fails if a different amount was written.
    ///
    /// No size is written by default.
    pub fn stream_size(&mut self, v: Option<u64>) -> &mut Self {
        self.stream_size = v;
        self
    }

    /// Only exists so that option strings meant for other lz4 tools can be parsed.
    /// Writing the legacy format is not supported, so `true` fails when the encoder is created.
    pub fn legacy(&mut self, v: bool) -> &mut Self {
        self.legacy = v;
        self
    }

    /// Set an option by name, see [`OPTION_NAMES`].
    #[throws]
    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        if !OPTION_NAMES.contains(&key) {
            throw!(Error::UnknownOption(key.to_owned()));
        }
        match key {
            "legacy" => self.legacy(flag(key, value)?),
            "blocksize_code" => self.blocksize_code(value.parse().map_err(|_| invalid(key, value))?),
            "block_dependency" => self.block_dependency(flag(key, value)?),
            "block_checksum" => self.block_checksum(flag(key, value)?),
            "stream_checksum" => self.stream_checksum(flag(key, value)?),
            "stream_size" => match value {
                "" | "none" => self.stream_size(None),
                n => self.stream_size(Some(n.parse().map_err(|_| invalid(key, value))?)),
            },
            other => unreachable!("option {:?} is listed but not handled", other),
        }
    }

    /// The descriptor of the frames written with these settings.
    #[throws]
    pub fn descriptor(&self) -> FrameDescriptor {
        if self.legacy {
            throw!(Error::LegacyOutputUnsupported);
        }
        let block_size = match BlockSize::from_code(self.blocksize_code) {
            Some(size) => size,
            None => throw!(Error::InvalidBlockSizeCode(self.blocksize_code)),
        };

        let mut flags = Flags::empty();
        flags.set(Flags::IndependentBlocks, !self.block_dependency);
        flags.set(Flags::BlockChecksums, self.block_checksum);
        flags.set(Flags::ContentChecksum, self.stream_checksum);
        FrameDescriptor::frame(flags, block_size, self.stream_size)
    }
}

fn invalid(key: &str, value: &str) -> Error {
    Error::InvalidValue { key: key.to_owned(), value: value.to_owned() }
}

fn flag(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

impl FromStr for CompressionSettings {
    type Err = ConfigError;

    #[throws(ConfigError)]
    fn from_str(s: &str) -> Self {
        let mut settings = CompressionSettings::default();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = match pair.find('=') {
                Some(i) => (pair[..i].trim(), pair[i + 1..].trim()),
                // a bare key switches a flag on
                None => (pair, "true"),
            };
            settings.set(key, value)?;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let descriptor = CompressionSettings::default().descriptor().unwrap();
        assert!(descriptor.block_independence());
        assert!(!descriptor.block_checksum());
        assert!(descriptor.stream_checksum());
        assert_eq!(descriptor.block_size(), Some(BlockSize::Max4MiB));
        assert_eq!(descriptor.stream_size(), None);
    }

    #[test]
    fn parse_option_string() {
        let settings: CompressionSettings = "block_checksum=true, blocksize_code=5,block_dependency,stream_size=99"
            .parse()
            .unwrap();
        let descriptor = settings.descriptor().unwrap();
        assert!(!descriptor.block_independence());
        assert!(descriptor.block_checksum());
        assert!(descriptor.stream_size_present());
        assert_eq!(descriptor.stream_size(), Some(99));
        assert_eq!(descriptor.block_maxsize(), 256 * 1024);
    }

    #[test]
    fn every_listed_option_is_accepted() {
        for &name in OPTION_NAMES {
            let value = if name == "blocksize_code" { "6" } else if name == "stream_size" { "12" } else { "false" };
            CompressionSettings::default().set(name, value).unwrap();
        }
    }

    #[test]
    fn unknown_keys_leave_settings_untouched() {
        let mut settings = CompressionSettings::default();
        for &key in &["Block_checksum", "block_checksum ", "level", ""] {
            assert_eq!(settings.set(key, "true").map(|_| ()), Err(ConfigError::UnknownOption(key.into())));
        }
        assert_eq!(settings, CompressionSettings::default());
    }

    #[test]
    fn bad_options() {
        assert_eq!(
            "compression=9".parse::<CompressionSettings>(),
            Err(ConfigError::UnknownOption("compression".into()))
        );
        assert_eq!(
            "block_checksum=maybe".parse::<CompressionSettings>(),
            Err(ConfigError::InvalidValue { key: "block_checksum".into(), value: "maybe".into() })
        );
        let settings: CompressionSettings = "blocksize_code=3".parse().unwrap();
        assert_eq!(settings.descriptor(), Err(ConfigError::InvalidBlockSizeCode(3)));
        let settings: CompressionSettings = "legacy=true".parse().unwrap();
        assert_eq!(settings.descriptor(), Err(ConfigError::LegacyOutputUnsupported));
    }
}
