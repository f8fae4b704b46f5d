//! The single error type returned by every fallible operation in this crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BitshuffleError {
    #[error("invalid item size {0}: elements must be at least one byte wide")]
    InvalidItemSize(usize),

    #[error("invalid block size {0}: must be a non-zero multiple of 8 elements")]
    InvalidBlockSize(usize),

    /// Input byte length disagrees with `n * itemsize`.
    #[error("buffer holds {actual} bytes but {n} elements of {itemsize} bytes need {expected}")]
    LengthMismatch {
        n: usize,
        itemsize: usize,
        expected: usize,
        actual: usize,
    },

    /// The framed stream is shorter (or longer) than its header and records declare.
    #[error("stream length mismatch: framing needs {expected} bytes, buffer has {actual}")]
    TruncatedStream { expected: usize, actual: usize },

    #[error("compressor failed on block {block}: {source}")]
    CompressorError {
        block: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("compressed block {block} is {len} bytes, which overflows its 4-byte length prefix")]
    BlockTooLarge { block: usize, len: usize },

    #[error("block {index} out of range: stream holds {count} blocks")]
    BlockOutOfRange { index: usize, count: usize },

    /// `n * itemsize` (or a size derived from it) does not fit in `usize`.
    #[error("{n} elements of {itemsize} bytes overflow the addressable size")]
    SizeOverflow { n: usize, itemsize: usize },

    /// The stream header declares more output than can be allocated.
    #[error("cannot allocate {bytes} bytes for the decoded output")]
    OutOfMemory { bytes: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl BitshuffleError {
    /// Wrap a codec failure for block `block`.
    pub(crate) fn compressor(block: usize, err: anyhow::Error) -> Self {
        BitshuffleError::CompressorError {
            block,
            source: err.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BitshuffleError>;
