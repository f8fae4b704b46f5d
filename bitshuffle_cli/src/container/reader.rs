use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use bitshuffle_core::format::{
    block_count, check_block_size, RECORD_PREFIX_SIZE, STREAM_HEADER_SIZE,
};
use bitshuffle_core::{Bitshuffle, BitshuffleError, Codec, StreamHeader};
use xxhash_rust::xxh3::xxh3_64;

use super::{
    ContainerError, ContainerHeader, Result, CONTAINER_HEADER_SIZE, FLAG_HAS_CHECKSUM,
};

/// Offset of the first record prefix in the file.
const RECORDS_START: u64 = (CONTAINER_HEADER_SIZE + STREAM_HEADER_SIZE) as u64;

/// Random-access reader for bitshuffle container files.
///
/// # Open sequence
/// 1. Read the 32-byte container header (magic, version, codec id, item size).
/// 2. Read the stream header that follows.
/// 3. Hop from length prefix to length prefix to locate every record. Only
///    the 4-byte prefixes are read; payloads are skipped with a seek.
///
/// # Access pattern
/// [`read_block`](Reader::read_block) seeks straight to one record and
/// decodes only that block. [`read_elements`](Reader::read_elements)
/// resolves an element range to the blocks that cover it and slices the
/// result precisely. [`read_all`](Reader::read_all) loads the whole stream,
/// decodes every block in parallel and checks the stored checksum.
pub struct Reader {
    file: File,
    pub header: ContainerHeader,
    pub stream_header: StreamHeader,
    /// Absolute file offsets of every record payload.
    records: Vec<Range<u64>>,
    element_count: usize,
    codec: Arc<dyn Codec>,
    ctx: &'static Bitshuffle,
}

impl Reader {
    /// Open a container file.
    ///
    /// `codec` must match the codec id stored in the header. Use
    /// `bitshuffle_codecs::codec_by_id(header.codec_id)` after a first
    /// [`read_header`](Reader::read_header) if the codec is not known up front.
    pub fn open(path: impl AsRef<Path>, codec: Arc<dyn Codec>) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let header = read_container_header(&mut file)?;
        if header.codec_id != codec.id() {
            return Err(ContainerError::CodecMismatch {
                file: header.codec_id,
                provided: codec.id(),
            });
        }

        let mut head = [0u8; STREAM_HEADER_SIZE];
        let filled = read_up_to(&mut file, &mut head)?;
        let stream_header = StreamHeader::from_bytes(&head[..filled])?;
        let block_size = stream_header.block_size as usize;
        check_block_size(block_size)?;
        let element_count = stream_header.element_count(header.itemsize as usize)?;
        let records = locate_records(&mut file, file_len, block_count(element_count, block_size))?;

        Ok(Self {
            file,
            header,
            stream_header,
            records,
            element_count,
            codec,
            ctx: Bitshuffle::global(),
        })
    }

    /// Read only the container header of the file at `path`.
    pub fn read_header(path: impl AsRef<Path>) -> Result<ContainerHeader> {
        let mut file = File::open(path)?;
        read_container_header(&mut file)
    }

    #[inline]
    pub fn itemsize(&self) -> usize {
        self.header.itemsize as usize
    }

    /// Elements stored in the file.
    #[inline]
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Elements per block (the last block may be smaller).
    #[inline]
    pub fn block_size(&self) -> usize {
        self.stream_header.block_size as usize
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.records.len()
    }

    /// Total uncompressed size in bytes.
    pub fn raw_size(&self) -> u64 {
        self.stream_header.total_bytes
    }

    /// Total compressed payload size in bytes (excluding headers and prefixes).
    pub fn compressed_size(&self) -> u64 {
        self.records.iter().map(|r| r.end - r.start).sum()
    }

    /// Compression ratio (raw / compressed).
    pub fn ratio(&self) -> f64 {
        let compressed = self.compressed_size();
        if compressed == 0 {
            return 1.0;
        }
        self.raw_size() as f64 / compressed as f64
    }

    /// Compressed payload size of every block, in order.
    pub fn record_sizes(&self) -> Vec<usize> {
        self.records.iter().map(|r| (r.end - r.start) as usize).collect()
    }

    /// Decompress and return the raw bytes of block `idx`.
    ///
    /// Only that block's payload is read from disk.
    pub fn read_block(&mut self, idx: usize) -> Result<Vec<u8>> {
        let span = self
            .records
            .get(idx)
            .ok_or(BitshuffleError::BlockOutOfRange {
                index: idx,
                count: self.records.len(),
            })?
            .clone();

        self.file.seek(SeekFrom::Start(span.start))?;
        let mut payload = vec![0u8; (span.end - span.start) as usize];
        self.file.read_exact(&mut payload)?;

        let start = idx * self.block_size();
        let elems = self.block_size().min(self.element_count - start);
        let mut out = zeroed(elems * self.itemsize())?;
        self.ctx
            .decode_block(self.codec.as_ref(), idx, &payload, &mut out, self.itemsize())?;
        Ok(out)
    }

    /// Decompress exactly `len` elements starting at element `start`.
    ///
    /// Only the blocks covering the range are read and decoded.
    pub fn read_elements(&mut self, start: usize, len: usize) -> Result<Vec<u8>> {
        let end = start.saturating_add(len);
        if end > self.element_count {
            return Err(ContainerError::RangeOutOfBounds {
                start,
                end,
                count: self.element_count,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let itemsize = self.itemsize();
        let block_size = self.block_size();
        let first_block = start / block_size;
        let last_block = (end - 1) / block_size;

        let mut result = Vec::with_capacity(len * itemsize);
        for block_idx in first_block..=last_block {
            let block_raw = self.read_block(block_idx)?;
            let block_start = block_idx * block_size;
            let from = start.max(block_start) - block_start;
            let to = end.min(block_start + block_size) - block_start;
            result.extend_from_slice(&block_raw[from * itemsize..to * itemsize]);
        }
        Ok(result)
    }

    /// Decompress the whole file and verify its checksum.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(CONTAINER_HEADER_SIZE as u64))?;
        let mut stream = Vec::new();
        self.file.read_to_end(&mut stream)?;

        let raw = self.ctx.decompress(
            &stream,
            self.element_count,
            self.itemsize(),
            0,
            self.codec.as_ref(),
        )?;
        if self.header.has_flag(FLAG_HAS_CHECKSUM) {
            let actual = xxh3_64(&raw);
            if actual != self.header.checksum {
                return Err(ContainerError::ChecksumMismatch {
                    expected: self.header.checksum,
                    actual,
                });
            }
        }
        Ok(raw)
    }
}

/// Read until `buf` is full or the file ends; returns the bytes read.
fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            k => filled += k,
        }
    }
    Ok(filled)
}

fn read_container_header(file: &mut File) -> Result<ContainerHeader> {
    let mut buf = [0u8; CONTAINER_HEADER_SIZE];
    let filled = read_up_to(file, &mut buf)?;
    if filled < CONTAINER_HEADER_SIZE {
        return Err(ContainerError::Invalid(format!(
            "file is {filled} bytes, shorter than the {CONTAINER_HEADER_SIZE}-byte header"
        )));
    }
    ContainerHeader::from_bytes(&buf)
}

/// Walk `count` record prefixes starting right after the stream header.
/// The records must end exactly at `file_len`.
fn locate_records(file: &mut File, file_len: u64, count: usize) -> Result<Vec<Range<u64>>> {
    // Stream-relative lengths, as the framing errors report them.
    let stream_len = |offset: u64| (offset - CONTAINER_HEADER_SIZE as u64) as usize;
    let truncated = |expected: u64| BitshuffleError::TruncatedStream {
        expected: stream_len(expected),
        actual: stream_len(file_len),
    };

    // Every record needs at least its prefix.
    let body = file_len.saturating_sub(RECORDS_START);
    if count as u64 > body / RECORD_PREFIX_SIZE as u64 {
        let needed = (count as u64)
            .saturating_mul(RECORD_PREFIX_SIZE as u64)
            .saturating_add(RECORDS_START);
        return Err(truncated(needed).into());
    }

    let mut records = Vec::with_capacity(count);
    let mut offset = RECORDS_START;
    let mut prefix = [0u8; RECORD_PREFIX_SIZE];
    for _ in 0..count {
        let payload_start = offset + RECORD_PREFIX_SIZE as u64;
        if payload_start > file_len {
            return Err(truncated(payload_start).into());
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut prefix)?;
        let end = payload_start + u32::from_be_bytes(prefix) as u64;
        if end > file_len {
            return Err(truncated(end).into());
        }
        records.push(payload_start..end);
        offset = end;
    }
    if offset != file_len {
        return Err(truncated(offset).into());
    }
    Ok(records)
}

/// Zeroed block buffer, or `OutOfMemory` when the allocator refuses.
fn zeroed(bytes: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes)
        .map_err(|_| BitshuffleError::OutOfMemory { bytes })?;
    out.resize(bytes, 0);
    Ok(out)
}
