use std::ops::Range;

use crate::error::{BitshuffleError, Result};

// ── Framed stream ──────────────────────────────────────────────────────────
//
// ```text
// [total_bytes: u64 BE][block_size: u32 BE]      ← 12-byte stream header
// [len: u32 BE][compressed block 0]
// [len: u32 BE][compressed block 1]
// ...
// ```
// `block_size` is in elements. The record count follows from the header and
// the item size: `ceil(total_bytes / itemsize / block_size)`.

/// Size of the framed stream header in bytes.
pub const STREAM_HEADER_SIZE: usize = 12;

/// Size of the length prefix in front of every compressed block.
pub const RECORD_PREFIX_SIZE: usize = 4;

/// Block sizes aim for this many bytes per block.
pub const TARGET_BLOCK_BYTES: usize = 8192;

/// Default block sizes never drop below this many elements.
pub const MIN_RECOMMENDED_BLOCK: usize = 128;

/// Block sizes must be a multiple of this many elements.
pub const BLOCK_MULTIPLE: usize = 8;

/// Default block size in elements for `itemsize`-byte elements.
///
/// Stable across versions: streams written with it stay decodable.
pub fn default_block_size(itemsize: usize) -> usize {
    let block = TARGET_BLOCK_BYTES / itemsize.max(1);
    let block = block - block % BLOCK_MULTIPLE;
    block.max(MIN_RECOMMENDED_BLOCK)
}

/// Number of blocks covering `n` elements.
pub fn block_count(n: usize, block_size: usize) -> usize {
    if block_size == 0 {
        return 0;
    }
    n.div_ceil(block_size)
}

/// Accept only a non-zero multiple of [`BLOCK_MULTIPLE`] that fits the
/// header's `u32`.
pub fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size % BLOCK_MULTIPLE != 0 || block_size > u32::MAX as usize {
        return Err(BitshuffleError::InvalidBlockSize(block_size));
    }
    Ok(())
}

/// Decoded 12-byte stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Uncompressed byte length of the whole buffer.
    pub total_bytes: u64,
    /// Elements per block (the last block may be shorter).
    pub block_size: u32,
}

impl StreamHeader {
    /// Serialize to exactly `STREAM_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf[..8].copy_from_slice(&self.total_bytes.to_be_bytes());
        buf[8..12].copy_from_slice(&self.block_size.to_be_bytes());
        buf
    }

    /// Parse the header at the start of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let head: &[u8; STREAM_HEADER_SIZE] = buf
            .get(..STREAM_HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or(BitshuffleError::TruncatedStream {
                expected: STREAM_HEADER_SIZE,
                actual: buf.len(),
            })?;
        let mut total = [0u8; 8];
        total.copy_from_slice(&head[..8]);
        let mut block = [0u8; 4];
        block.copy_from_slice(&head[8..]);
        Ok(Self {
            total_bytes: u64::from_be_bytes(total),
            block_size: u32::from_be_bytes(block),
        })
    }

    /// Element count implied by the header, or `SizeMismatch` when the byte
    /// total is not a whole number of elements.
    pub fn element_count(&self, itemsize: usize) -> Result<usize> {
        let total = usize::try_from(self.total_bytes).map_err(|_| BitshuffleError::SizeMismatch {
            expected: usize::MAX,
            actual: usize::MAX,
        })?;
        if itemsize == 0 {
            return Err(BitshuffleError::InvalidItemSize(itemsize));
        }
        if total % itemsize != 0 {
            return Err(BitshuffleError::SizeMismatch {
                expected: total - total % itemsize,
                actual: total,
            });
        }
        Ok(total / itemsize)
    }
}

/// Byte ranges of `count` record payloads within `stream` (which starts
/// with the stream header). The records must end exactly at the end of
/// `stream`.
pub fn record_spans(stream: &[u8], count: usize) -> Result<Vec<Range<usize>>> {
    // Every record needs at least its prefix; a header claiming more blocks
    // than that is rejected before anything is sized from it.
    let body = stream.len().saturating_sub(STREAM_HEADER_SIZE);
    if count > body / RECORD_PREFIX_SIZE {
        return Err(BitshuffleError::TruncatedStream {
            expected: count
                .saturating_mul(RECORD_PREFIX_SIZE)
                .saturating_add(STREAM_HEADER_SIZE),
            actual: stream.len(),
        });
    }
    let mut spans = Vec::with_capacity(count);
    let mut offset = STREAM_HEADER_SIZE;
    for _ in 0..count {
        let prefix_end = offset + RECORD_PREFIX_SIZE;
        let prefix = stream
            .get(offset..prefix_end)
            .ok_or(BitshuffleError::TruncatedStream {
                expected: prefix_end,
                actual: stream.len(),
            })?;
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let end = prefix_end
            .checked_add(len)
            .filter(|&end| end <= stream.len())
            .ok_or(BitshuffleError::TruncatedStream {
                expected: prefix_end.saturating_add(len),
                actual: stream.len(),
            })?;
        spans.push(prefix_end..end);
        offset = end;
    }
    if offset != stream.len() {
        return Err(BitshuffleError::TruncatedStream {
            expected: offset,
            actual: stream.len(),
        });
    }
    Ok(spans)
}

/// Record payloads of `stream`, see [`record_spans`].
pub fn split_records(stream: &[u8], count: usize) -> Result<Vec<&[u8]>> {
    Ok(record_spans(stream, count)?
        .into_iter()
        .map(|span| &stream[span])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_size_values() {
        assert_eq!(default_block_size(1), 8192);
        assert_eq!(default_block_size(4), 2048);
        assert_eq!(default_block_size(8), 1024);
        // 8192 / 3 = 2730 -> 2728
        assert_eq!(default_block_size(3), 2728);
        // Large structs bottom out at the minimum.
        assert_eq!(default_block_size(100), 128);
        assert_eq!(default_block_size(1000), 128);
        for s in 1..300 {
            assert_eq!(default_block_size(s) % BLOCK_MULTIPLE, 0);
        }
    }

    #[test]
    fn stream_header_is_big_endian() {
        let h = StreamHeader {
            total_bytes: 0x0102,
            block_size: 0x0304,
        };
        let bytes = h.to_bytes();
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4]);
        assert_eq!(StreamHeader::from_bytes(&bytes).unwrap(), h);
    }

    #[test]
    fn short_header_is_truncated() {
        assert!(matches!(
            StreamHeader::from_bytes(&[0u8; 5]),
            Err(BitshuffleError::TruncatedStream { expected: 12, actual: 5 })
        ));
    }

    #[test]
    fn split_records_walks_prefixes() {
        let mut stream = vec![0u8; STREAM_HEADER_SIZE];
        stream.extend_from_slice(&3u32.to_be_bytes());
        stream.extend_from_slice(b"abc");
        stream.extend_from_slice(&0u32.to_be_bytes());
        stream.extend_from_slice(&1u32.to_be_bytes());
        stream.push(b'z');
        let records = split_records(&stream, 3).unwrap();
        assert_eq!(records, vec![&b"abc"[..], &b""[..], &b"z"[..]]);

        // One record short, one byte extra, payload past the end.
        assert!(split_records(&stream, 4).is_err());
        let mut extra = stream.clone();
        extra.push(0);
        assert!(matches!(
            split_records(&extra, 3),
            Err(BitshuffleError::TruncatedStream { .. })
        ));
        assert!(split_records(&stream[..stream.len() - 1], 3).is_err());
    }

    #[test]
    fn block_size_rules() {
        assert!(check_block_size(8).is_ok());
        assert!(check_block_size(4096).is_ok());
        assert!(check_block_size(0).is_err());
        assert!(check_block_size(12).is_err());
    }

    #[test]
    fn record_count_beyond_stream_is_truncated() {
        let stream = StreamHeader {
            total_bytes: 1 << 40,
            block_size: 8,
        }
        .to_bytes();
        assert!(matches!(
            record_spans(&stream, usize::MAX),
            Err(BitshuffleError::TruncatedStream { actual: 12, .. })
        ));
        assert!(matches!(
            record_spans(&stream, 1 << 37),
            Err(BitshuffleError::TruncatedStream { .. })
        ));
    }
}
