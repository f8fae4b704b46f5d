//! `.bshuf` container files: a small header in front of a framed bitshuffle
//! stream, so the CLI can store item size, codec and a checksum next to the
//! data.
//!
//! ```text
//! [CONTAINER HEADER: 32 bytes, little-endian]
//! [STREAM HEADER: 12 bytes, big-endian]
//! [len][BLOCK 0] [len][BLOCK 1] ... [len][BLOCK N-1]
//! ```

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use bitshuffle_core::BitshuffleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("invalid container: {0}")]
    Invalid(String),

    #[error("codec mismatch: file uses codec {file} but provided codec has id {provided}")]
    CodecMismatch { file: u16, provided: u16 },

    #[error("checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("elements {start}..{end} out of range: file holds {count}")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        count: usize,
    },

    #[error(transparent)]
    Bitshuffle(#[from] BitshuffleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContainerError>;

/// Magic bytes opening a container file: "BSHUF" + format major + padding.
pub const MAGIC: &[u8; 8] = b"BSHUF\x01\x00\x00";

/// Fixed size of the container header in bytes.
///   magic[8] + version:u16 + codec_id:u16 + itemsize:u32
///   + checksum:u64 + flags:u64
///   = 8 + 2 + 2 + 4 + 8 + 8 = 32
pub const CONTAINER_HEADER_SIZE: usize = 32;

pub const CONTAINER_VERSION: u16 = 1;

/// `checksum` holds the xxhash3-64 of the uncompressed data.
pub const FLAG_HAS_CHECKSUM: u64 = 1 << 0;

/// Decoded representation of the 32-byte container header. The framed
/// stream that follows keeps its own big-endian framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub codec_id: u16,
    pub itemsize: u32,
    pub checksum: u64,
    pub flags: u64,
}

impl ContainerHeader {
    /// Serialize to exactly `CONTAINER_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; CONTAINER_HEADER_SIZE] {
        let mut buf = [0u8; CONTAINER_HEADER_SIZE];
        buf[..8].copy_from_slice(MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[10..12].copy_from_slice(&self.codec_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.itemsize.to_le_bytes());
        buf[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf[24..32].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Deserialize, checking the magic, version and item size.
    pub fn from_bytes(buf: &[u8; CONTAINER_HEADER_SIZE]) -> Result<Self> {
        if &buf[..8] != MAGIC {
            return Err(ContainerError::Invalid(
                "bad magic bytes, not a bitshuffle container".into(),
            ));
        }
        let header = Self {
            version: u16::from_le_bytes([buf[8], buf[9]]),
            codec_id: u16::from_le_bytes([buf[10], buf[11]]),
            itemsize: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
            checksum: u64::from_le_bytes(le8(&buf[16..24])),
            flags: u64::from_le_bytes(le8(&buf[24..32])),
        };
        if header.version != CONTAINER_VERSION {
            return Err(ContainerError::Invalid(format!(
                "unsupported container version {} (only {CONTAINER_VERSION} is supported)",
                header.version
            )));
        }
        if header.itemsize == 0 {
            return Err(ContainerError::Invalid("item size is zero".into()));
        }
        Ok(header)
    }

    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }
}

fn le8(src: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(src);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_and_magic() {
        let h = ContainerHeader {
            version: CONTAINER_VERSION,
            codec_id: 2,
            itemsize: 8,
            checksum: 0xDEAD_BEEF,
            flags: FLAG_HAS_CHECKSUM,
        };
        let mut bytes = h.to_bytes();
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(ContainerHeader::from_bytes(&bytes).unwrap(), h);

        bytes[0] = b'X';
        assert!(matches!(
            ContainerHeader::from_bytes(&bytes),
            Err(ContainerError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unknown_version_and_zero_itemsize() {
        let mut h = ContainerHeader {
            version: 2,
            codec_id: 0,
            itemsize: 4,
            checksum: 0,
            flags: 0,
        };
        assert!(ContainerHeader::from_bytes(&h.to_bytes()).is_err());
        h.version = CONTAINER_VERSION;
        h.itemsize = 0;
        assert!(ContainerHeader::from_bytes(&h.to_bytes()).is_err());
    }
}
