use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use bitshuffle_core::format::{check_block_size, default_block_size, STREAM_HEADER_SIZE};
use bitshuffle_core::{Bitshuffle, BitshuffleError, Codec, StreamHeader};
use log::debug;
use xxhash_rust::xxh3::Xxh3;

use super::{
    ContainerHeader, Result, CONTAINER_HEADER_SIZE, CONTAINER_VERSION, FLAG_HAS_CHECKSUM,
};

/// Streaming writer for bitshuffle container files.
///
/// # Write contract
/// Call [`write`](Writer::write) any number of times with arbitrary-sized
/// byte slices. The writer accumulates data and compresses every complete
/// block as soon as it has been gathered. Call [`finish`](Writer::finish) to
/// flush the trailing partial block and write back the final headers.
///
/// # Layout written
/// ```text
/// [CONTAINER HEADER: 32 bytes placeholder]
/// [STREAM HEADER: 12 bytes placeholder]
/// [len][BLOCK 0] [len][BLOCK 1] ... [len][BLOCK N-1]
/// ← seek back to 0, overwrite both headers with real values
/// ```
pub struct Writer {
    file: File,
    codec: Arc<dyn Codec>,
    ctx: &'static Bitshuffle,
    itemsize: usize,
    block_size: usize,
    /// `block_size * itemsize`, checked at creation.
    block_bytes: usize,
    /// Raw bytes not yet compressed.
    pending: Vec<u8>,
    /// Running checksum of every raw byte written.
    hasher: Xxh3,
    total_bytes: u64,
    blocks_written: usize,
}

impl Writer {
    /// Create a new container at `path` for `itemsize`-byte elements.
    ///
    /// Overwrites any existing file. `block_size` is in elements; pass 0 for
    /// the default.
    pub fn create(
        path: impl AsRef<Path>,
        codec: Arc<dyn Codec>,
        itemsize: usize,
        block_size: usize,
    ) -> Result<Self> {
        if itemsize == 0 || u32::try_from(itemsize).is_err() {
            return Err(BitshuffleError::InvalidItemSize(itemsize).into());
        }
        let block_size = if block_size == 0 {
            default_block_size(itemsize)
        } else {
            block_size
        };
        check_block_size(block_size)?;
        let block_bytes = block_size
            .checked_mul(itemsize)
            .ok_or(BitshuffleError::SizeOverflow {
                n: block_size,
                itemsize,
            })?;

        let mut file = File::create(path)?;
        // Placeholders, rewritten in finish()
        file.write_all(&[0u8; CONTAINER_HEADER_SIZE + STREAM_HEADER_SIZE])?;
        Ok(Self {
            file,
            codec,
            ctx: Bitshuffle::global(),
            itemsize,
            block_size,
            block_bytes,
            pending: Vec::new(),
            hasher: Xxh3::new(),
            total_bytes: 0,
            blocks_written: 0,
        })
    }

    /// Buffer `data` and compress complete blocks as they fill up.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.hasher.update(data);
        self.total_bytes += data.len() as u64;
        self.pending.extend_from_slice(data);

        let ready = self.pending.len() - self.pending.len() % self.block_bytes;
        if ready > 0 {
            let raw: Vec<u8> = self.pending.drain(..ready).collect();
            self.flush_blocks(&raw)?;
        }
        Ok(())
    }

    fn flush_blocks(&mut self, raw: &[u8]) -> Result<()> {
        let blocks = self.ctx.encode_blocks(
            self.codec.as_ref(),
            self.blocks_written,
            raw,
            self.itemsize,
            self.block_size,
        )?;
        for block in &blocks {
            self.file.write_all(&(block.len() as u32).to_be_bytes())?;
            self.file.write_all(block)?;
        }
        self.blocks_written += blocks.len();
        Ok(())
    }

    /// Flush remaining buffered data and seal the file by writing the final
    /// headers.
    ///
    /// Returns the number of blocks written.
    pub fn finish(mut self) -> Result<usize> {
        if self.pending.len() % self.itemsize != 0 {
            let n = (self.total_bytes / self.itemsize as u64) as usize;
            return Err(BitshuffleError::LengthMismatch {
                n,
                itemsize: self.itemsize,
                expected: n * self.itemsize,
                actual: self.total_bytes as usize,
            }
            .into());
        }
        if !self.pending.is_empty() {
            let remaining = std::mem::take(&mut self.pending);
            self.flush_blocks(&remaining)?;
        }

        let header = ContainerHeader {
            version: CONTAINER_VERSION,
            codec_id: self.codec.id(),
            itemsize: self.itemsize as u32,
            checksum: self.hasher.digest(),
            flags: FLAG_HAS_CHECKSUM,
        };
        let stream = StreamHeader {
            total_bytes: self.total_bytes,
            block_size: self.block_size as u32,
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        self.file.write_all(&stream.to_bytes())?;
        self.file.flush()?;

        debug!(
            "wrote container: {} bytes in {} blocks with {}",
            self.total_bytes,
            self.blocks_written,
            self.codec.name()
        );
        Ok(self.blocks_written)
    }
}
