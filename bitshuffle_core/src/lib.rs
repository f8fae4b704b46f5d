//! Bitshuffle: bit-level transposition of typed arrays for better compression.
//!
//! The free functions below run on the process-wide [`Bitshuffle`] context,
//! which picks the widest transpose backend the CPU supports on first use.
//! Build a context yourself to force a backend or a thread count.

pub mod backend;
mod bit_transpose;
mod byte_transpose;
pub mod codec;
pub mod config;
pub mod cpu_detect;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod kernel;
pub mod pipeline;

pub use backend::Backend;
pub use codec::{Codec, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
pub use config::PipelineConfig;
pub use dispatch::{Capabilities, Dispatcher};
pub use error::{BitshuffleError, Result};
pub use format::{default_block_size, StreamHeader, STREAM_HEADER_SIZE};
pub use kernel::{trans_bit_8x8, Tile, TILE_BYTES};
pub use pipeline::{compress_bound, Bitshuffle};

fn global() -> &'static Bitshuffle {
    Bitshuffle::global()
}

/// Selected backend and what the CPU offers.
pub fn capabilities() -> Capabilities {
    global().dispatcher().capabilities()
}

/// Whether the selected backend runs SSE2 code.
pub fn using_sse2() -> bool {
    matches!(global().dispatcher().backend(), Backend::Wide16 | Backend::Wide32)
}

/// Whether the selected backend runs AVX2 code.
pub fn using_avx2() -> bool {
    global().dispatcher().backend() == Backend::Wide32
}

pub fn transpose_tile(tile: &Tile) -> Tile {
    global().dispatcher().transpose_tile(tile)
}

/// Group byte `k` of every element into plane `k`.
pub fn transpose_bytes(input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
    global().dispatcher().transpose_bytes(input, n, itemsize)
}

pub fn untranspose_bytes(input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
    global().dispatcher().untranspose_bytes(input, n, itemsize)
}

/// Bit transpose of the whole buffer as one block.
pub fn transpose_bits(input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
    global().dispatcher().transpose_bits(input, n, itemsize)
}

pub fn untranspose_bits(input: &[u8], n: usize, itemsize: usize) -> Result<Vec<u8>> {
    global().dispatcher().untranspose_bits(input, n, itemsize)
}

/// Blocked bit transpose; `block_size == 0` selects the default.
pub fn bitshuffle(input: &[u8], n: usize, itemsize: usize, block_size: usize) -> Result<Vec<u8>> {
    global().bitshuffle(input, n, itemsize, block_size)
}

pub fn bitunshuffle(input: &[u8], n: usize, itemsize: usize, block_size: usize) -> Result<Vec<u8>> {
    global().bitunshuffle(input, n, itemsize, block_size)
}

/// Bitshuffle and compress into a framed stream.
pub fn compress(
    input: &[u8],
    n: usize,
    itemsize: usize,
    block_size: usize,
    codec: &dyn Codec,
) -> Result<Vec<u8>> {
    global().compress(input, n, itemsize, block_size, codec)
}

/// Inverse of [`compress`]. `block_size == 0` reads it from the stream.
pub fn decompress(
    input: &[u8],
    total_n: usize,
    itemsize: usize,
    block_size: usize,
    codec: &dyn Codec,
) -> Result<Vec<u8>> {
    global().decompress(input, total_n, itemsize, block_size, codec)
}

pub fn decompress_stream(input: &[u8], itemsize: usize, codec: &dyn Codec) -> Result<Vec<u8>> {
    global().decompress_stream(input, itemsize, codec)
}
