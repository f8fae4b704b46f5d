//! Block compression pipeline.
//!
//! A buffer of `n` elements is cut into blocks of `block_size` elements (the
//! last block may be shorter). Each block is bit-transposed on its own and
//! handed to the external [`Codec`]; the compressed blocks are framed behind a
//! [`StreamHeader`] with a 4-byte length prefix each. Blocks never depend on
//! each other, so both directions run block-parallel on a rayon pool.

use std::sync::OnceLock;

use log::{debug, trace, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::byte_transpose::validate;
use crate::codec::Codec;
use crate::config::PipelineConfig;
use crate::dispatch::Dispatcher;
use crate::error::{BitshuffleError, Result};
use crate::format::{
    block_count, check_block_size, default_block_size, split_records, StreamHeader,
    RECORD_PREFIX_SIZE, STREAM_HEADER_SIZE,
};

/// Explicit context for the pipeline: configuration, the resolved transpose
/// backend and (optionally) a dedicated worker pool.
///
/// The crate-root free functions use [`Bitshuffle::global`]; build your own
/// with [`Bitshuffle::new`] to pin a backend or a thread count.
#[derive(Debug)]
pub struct Bitshuffle {
    config: PipelineConfig,
    dispatcher: Dispatcher,
    pool: Option<ThreadPool>,
}

impl Bitshuffle {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let dispatcher = match config.backend {
            Some(requested) => Dispatcher::with_backend(requested),
            None => *Dispatcher::global(),
        };
        let pool = match config.threads {
            Some(threads) if threads > 1 => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("bshuf-worker-{i}"))
                    .build()?,
            ),
            _ => None,
        };
        debug!(
            "bitshuffle context: backend={}, threads={:?}, block_size={:?}",
            dispatcher.backend(),
            config.threads,
            config.block_size
        );
        Ok(Self {
            config,
            dispatcher,
            pool,
        })
    }

    /// Process-wide context built from the environment on first use.
    pub fn global() -> &'static Bitshuffle {
        static GLOBAL: OnceLock<Bitshuffle> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = PipelineConfig::from_env();
            match Bitshuffle::new(config.clone()) {
                Ok(ctx) => ctx,
                Err(e) => {
                    warn!("{e}; falling back to the global rayon pool");
                    let config = PipelineConfig {
                        threads: None,
                        ..config
                    };
                    let dispatcher = match config.backend {
                        Some(requested) => Dispatcher::with_backend(requested),
                        None => *Dispatcher::global(),
                    };
                    Bitshuffle {
                        config,
                        dispatcher,
                        pool: None,
                    }
                }
            }
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn sequential(&self) -> bool {
        self.config.threads == Some(1)
    }

    fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// `0` selects the configured or default block size.
    fn effective_block_size(&self, block_size: usize, itemsize: usize) -> usize {
        if block_size != 0 {
            return block_size;
        }
        self.config
            .block_size
            .unwrap_or_else(|| default_block_size(itemsize))
    }

    /// Apply `f(src_block, dst_block)` to every block pair.
    fn for_each_block<F>(&self, input: &[u8], out: &mut [u8], block_bytes: usize, f: F)
    where
        F: Fn(&[u8], &mut [u8]) + Send + Sync,
    {
        if self.sequential() {
            for (src, dst) in input.chunks(block_bytes).zip(out.chunks_mut(block_bytes)) {
                f(src, dst);
            }
        } else {
            self.install(|| {
                input
                    .par_chunks(block_bytes)
                    .zip(out.par_chunks_mut(block_bytes))
                    .for_each(|(src, dst)| f(src, dst));
            });
        }
    }

    // ── Blocked transpose without compression ──────────────────────────────

    /// Bit-transpose `input` block by block. `block_size == 0` picks the
    /// default for `itemsize`.
    pub fn bitshuffle(
        &self,
        input: &[u8],
        n: usize,
        itemsize: usize,
        block_size: usize,
    ) -> Result<Vec<u8>> {
        validate(input.len(), n, itemsize)?;
        let block_size = self.effective_block_size(block_size, itemsize);
        check_block_size(block_size)?;
        let mut out = vec![0u8; input.len()];
        self.for_each_block(input, &mut out, block_size.saturating_mul(itemsize), |src, dst| {
            self.dispatcher
                .transpose_bits_into(src, dst, src.len() / itemsize, itemsize)
        });
        Ok(out)
    }

    /// Inverse of [`bitshuffle`](Self::bitshuffle); `block_size` must match.
    pub fn bitunshuffle(
        &self,
        input: &[u8],
        n: usize,
        itemsize: usize,
        block_size: usize,
    ) -> Result<Vec<u8>> {
        validate(input.len(), n, itemsize)?;
        let block_size = self.effective_block_size(block_size, itemsize);
        check_block_size(block_size)?;
        let mut out = vec![0u8; input.len()];
        self.for_each_block(input, &mut out, block_size.saturating_mul(itemsize), |src, dst| {
            self.dispatcher
                .untranspose_bits_into(src, dst, src.len() / itemsize, itemsize)
        });
        Ok(out)
    }

    // ── Compression ────────────────────────────────────────────────────────

    fn encode_block(
        &self,
        codec: &dyn Codec,
        index: usize,
        raw: &[u8],
        itemsize: usize,
    ) -> Result<Vec<u8>> {
        let mut shuffled = vec![0u8; raw.len()];
        self.dispatcher
            .transpose_bits_into(raw, &mut shuffled, raw.len() / itemsize, itemsize);
        let compressed = codec
            .compress_block(&shuffled)
            .map_err(|e| BitshuffleError::compressor(index, e))?;
        if compressed.len() > u32::MAX as usize {
            return Err(BitshuffleError::BlockTooLarge {
                block: index,
                len: compressed.len(),
            });
        }
        trace!("block {index}: {} -> {} bytes", raw.len(), compressed.len());
        Ok(compressed)
    }

    /// Transpose and compress consecutive blocks of `input`, numbering them
    /// from `first_index`. Only the last block may be short.
    ///
    /// The returned payloads are unframed; callers that stream blocks out as
    /// they fill write each one behind its own length prefix.
    pub fn encode_blocks(
        &self,
        codec: &dyn Codec,
        first_index: usize,
        input: &[u8],
        itemsize: usize,
        block_size: usize,
    ) -> Result<Vec<Vec<u8>>> {
        if itemsize == 0 {
            return Err(BitshuffleError::InvalidItemSize(itemsize));
        }
        validate(input.len(), input.len() / itemsize, itemsize)?;
        check_block_size(block_size)?;
        // Saturating: a block wider than the address space is the whole input.
        let block_bytes = block_size.saturating_mul(itemsize);
        if self.sequential() {
            input
                .chunks(block_bytes)
                .enumerate()
                .map(|(i, raw)| self.encode_block(codec, first_index + i, raw, itemsize))
                .collect()
        } else {
            self.install(|| {
                input
                    .par_chunks(block_bytes)
                    .enumerate()
                    .map(|(i, raw)| self.encode_block(codec, first_index + i, raw, itemsize))
                    .collect()
            })
        }
    }

    /// Bitshuffle and compress `n` elements of `itemsize` bytes into a framed
    /// stream, `block_size` elements per block.
    pub fn compress(
        &self,
        input: &[u8],
        n: usize,
        itemsize: usize,
        block_size: usize,
        codec: &dyn Codec,
    ) -> Result<Vec<u8>> {
        validate(input.len(), n, itemsize)?;
        check_block_size(block_size)?;
        let blocks = self.encode_blocks(codec, 0, input, itemsize, block_size)?;

        let body: usize = blocks.iter().map(|b| RECORD_PREFIX_SIZE + b.len()).sum();
        let mut out = Vec::with_capacity(STREAM_HEADER_SIZE + body);
        let header = StreamHeader {
            total_bytes: input.len() as u64,
            block_size: block_size as u32,
        };
        out.extend_from_slice(&header.to_bytes());
        for block in &blocks {
            out.extend_from_slice(&(block.len() as u32).to_be_bytes());
            out.extend_from_slice(block);
        }
        debug!(
            "compressed {n} x {itemsize}-byte elements with {} in {} blocks: {} -> {} bytes",
            codec.name(),
            blocks.len(),
            input.len(),
            out.len()
        );
        Ok(out)
    }

    /// Decompress one record payload into `dst` and undo its bit transpose.
    /// `dst` must be exactly the block's raw size.
    pub fn decode_block(
        &self,
        codec: &dyn Codec,
        index: usize,
        payload: &[u8],
        dst: &mut [u8],
        itemsize: usize,
    ) -> Result<()> {
        if itemsize == 0 {
            return Err(BitshuffleError::InvalidItemSize(itemsize));
        }
        validate(dst.len(), dst.len() / itemsize, itemsize)?;
        let raw = codec
            .decompress_block(payload, dst.len())
            .map_err(|e| BitshuffleError::compressor(index, e))?;
        if raw.len() != dst.len() {
            return Err(BitshuffleError::compressor(
                index,
                anyhow::anyhow!("decompressed to {} bytes, expected {}", raw.len(), dst.len()),
            ));
        }
        self.dispatcher
            .untranspose_bits_into(&raw, dst, dst.len() / itemsize, itemsize);
        Ok(())
    }

    /// Parse and check the stream header against the caller's parameters.
    /// Returns the block size recorded in the stream.
    fn check_header(
        header: &StreamHeader,
        total_n: usize,
        itemsize: usize,
        block_size: usize,
    ) -> Result<usize> {
        if itemsize == 0 {
            return Err(BitshuffleError::InvalidItemSize(itemsize));
        }
        let expected = total_n
            .checked_mul(itemsize)
            .ok_or(BitshuffleError::SizeOverflow {
                n: total_n,
                itemsize,
            })?;
        if header.total_bytes != expected as u64 {
            return Err(BitshuffleError::SizeMismatch {
                expected,
                actual: header.total_bytes as usize,
            });
        }
        let stored = header.block_size as usize;
        check_block_size(stored)?;
        if block_size != 0 && block_size != stored {
            return Err(BitshuffleError::InvalidBlockSize(block_size));
        }
        Ok(stored)
    }

    /// Decompress a framed stream holding `total_n` elements of `itemsize`
    /// bytes. `block_size == 0` trusts the block size in the stream header;
    /// any other value must match it.
    pub fn decompress(
        &self,
        input: &[u8],
        total_n: usize,
        itemsize: usize,
        block_size: usize,
        codec: &dyn Codec,
    ) -> Result<Vec<u8>> {
        if block_size != 0 {
            check_block_size(block_size)?;
        }
        let header = StreamHeader::from_bytes(input)?;
        let block_size = Self::check_header(&header, total_n, itemsize, block_size)?;
        let records = split_records(input, block_count(total_n, block_size))?;

        let mut out = zeroed(total_n * itemsize)?;
        let block_bytes = block_size.saturating_mul(itemsize);
        if self.sequential() {
            for (i, (dst, payload)) in out.chunks_mut(block_bytes).zip(records).enumerate() {
                self.decode_block(codec, i, payload, dst, itemsize)?;
            }
        } else {
            self.install(|| {
                out.par_chunks_mut(block_bytes)
                    .zip(records.into_par_iter())
                    .enumerate()
                    .try_for_each(|(i, (dst, payload))| {
                        self.decode_block(codec, i, payload, dst, itemsize)
                    })
            })?;
        }
        debug!(
            "decompressed {} blocks with {}: {} -> {} bytes",
            block_count(total_n, block_size),
            codec.name(),
            input.len(),
            out.len()
        );
        Ok(out)
    }

    /// Decompress a stream using only the element count and block size
    /// recorded in its header.
    pub fn decompress_stream(
        &self,
        input: &[u8],
        itemsize: usize,
        codec: &dyn Codec,
    ) -> Result<Vec<u8>> {
        let header = StreamHeader::from_bytes(input)?;
        let total_n = header.element_count(itemsize)?;
        self.decompress(input, total_n, itemsize, 0, codec)
    }

    /// Decode only block `index` of a stream. The stream is still walked in
    /// full to locate the record, but only one block is decompressed.
    pub fn decompress_block(
        &self,
        input: &[u8],
        itemsize: usize,
        index: usize,
        codec: &dyn Codec,
    ) -> Result<Vec<u8>> {
        let header = StreamHeader::from_bytes(input)?;
        let total_n = header.element_count(itemsize)?;
        let block_size = Self::check_header(&header, total_n, itemsize, 0)?;
        let count = block_count(total_n, block_size);
        let records = split_records(input, count)?;
        let payload = records
            .get(index)
            .ok_or(BitshuffleError::BlockOutOfRange { index, count })?;

        let start = index * block_size;
        let elems = block_size.min(total_n - start);
        let mut out = zeroed(elems * itemsize)?;
        self.decode_block(codec, index, payload, &mut out, itemsize)?;
        Ok(out)
    }
}

/// Upper bound on the size of [`Bitshuffle::compress`] output, including the
/// stream header and every length prefix, assuming no block compresses.
pub fn compress_bound(
    n: usize,
    itemsize: usize,
    block_size: usize,
    codec: &dyn Codec,
) -> Result<usize> {
    if itemsize == 0 {
        return Err(BitshuffleError::InvalidItemSize(itemsize));
    }
    check_block_size(block_size)?;
    let overflow = || BitshuffleError::SizeOverflow { n, itemsize };
    let block_bytes = block_size.checked_mul(itemsize).ok_or_else(overflow)?;
    let per_block = codec
        .compress_bound(block_bytes)
        .checked_add(RECORD_PREFIX_SIZE)
        .ok_or_else(overflow)?;
    let mut bound = (n / block_size)
        .checked_mul(per_block)
        .and_then(|b| b.checked_add(STREAM_HEADER_SIZE))
        .ok_or_else(overflow)?;
    let rest = n % block_size;
    if rest > 0 {
        // rest < block_size, so this product is below block_bytes.
        bound = codec
            .compress_bound(rest * itemsize)
            .checked_add(RECORD_PREFIX_SIZE)
            .and_then(|tail| bound.checked_add(tail))
            .ok_or_else(overflow)?;
    }
    Ok(bound)
}

/// Zeroed output buffer, or `OutOfMemory` when the allocator refuses.
fn zeroed(bytes: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes)
        .map_err(|_| BitshuffleError::OutOfMemory { bytes })?;
    out.resize(bytes, 0);
    Ok(out)
}
